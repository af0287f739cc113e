use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use riskreview_server::api::router;
use riskreview_server::directory::{PersonDirectory, StaticDirectory};
use riskreview_server::repository::SqliteRepository;
use riskreview_server::{AppState, Config, RiskReviewService, SystemClock};

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, cancelling in-flight operations");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "Starting risk assessment review service ({})",
        riskreview_server::get_service_version()
    );

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let directory: Arc<dyn PersonDirectory> = match &config.directory_path {
        Some(path) => {
            let directory = StaticDirectory::from_json_file(path)
                .await
                .context("Failed to load person directory")?;
            if directory.is_empty() {
                warn!(
                    "{} lists nobody; every approver id will be rejected",
                    path.display()
                );
            } else {
                info!("Loaded {} people from {}", directory.len(), path.display());
            }
            Arc::new(directory)
        }
        None => {
            warn!("DIRECTORY_PATH not set; every approver id will be rejected");
            Arc::new(StaticDirectory::new())
        }
    };

    let db_path = config.database_path();
    info!("Using state database: {}", db_path.display());
    let repository =
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    info!(
        "Approvals required: {}, dashboard lookahead: {} days, distinct approvers: {}",
        config.review.minimum_approvals_required,
        config.review.review_lookahead_days,
        config.review.count_distinct_approvers
    );

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        service: RiskReviewService::new(
            Arc::new(repository),
            directory,
            Arc::new(SystemClock),
            config.review,
        ),
        shutdown: shutdown.clone(),
    });

    let app = router(app_state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}
