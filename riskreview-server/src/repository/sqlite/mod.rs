//! SQLite implementation of `AssessmentRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Transactions
//!
//! Every write that must be atomic runs inside an `IMMEDIATE` transaction, so
//! the write lock is taken before anything is read. Category name uniqueness
//! is backed by a `UNIQUE` index on the normalized name, and assessment writes
//! are compare-and-swap on the `version` column.


use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use tracing::{debug, warn};

use riskreview_core::{
    category_name_key, Actor, Approval, ApprovalDraft, ApprovalId, AssessmentDetails,
    AssessmentDraft, AssessmentId, Audit, Category, CategoryDraft, CategoryId, PersonId,
    ReviewInterval, ReviewStatus, RiskAssessment,
};

use super::{AssessmentRepository, RepositoryError};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

const CATEGORY_COLUMNS: &str =
    "id, name, description, created_by, created_at, modified_by, modified_at";

const ASSESSMENT_COLUMNS: &str = "id, category_id, title, description, scope, notes, \
     review_interval, last_review_date, next_review_date, status, \
     created_by, created_at, modified_by, modified_at, version";

const APPROVAL_COLUMNS: &str = "id, assessment_id, approver_id, approved_at, notes";

/// SQLite-backed assessment repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Database connection. Exposed as `pub(crate)` for tests that need to
    /// corrupt rows or inspect the schema directly.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability (survives OS/power failure)
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    /// - `foreign_keys = ON` so approvals cannot outlive their assessment
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        // Ensure parent directory exists (unless it's :memory: or empty path)
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Assessment records carry names of people; keep the file private (Unix only)
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support, so verify WAL was actually enabled. In-memory
        // databases report "memory", which is expected.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     The database requires WAL mode for durability and concurrency guarantees.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // Get current version (0 if table is empty = fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    name_key TEXT NOT NULL UNIQUE,
                    description TEXT,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    modified_by TEXT,
                    modified_at TEXT
                );

                CREATE TABLE IF NOT EXISTS risk_assessments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    category_id INTEGER NOT NULL REFERENCES categories(id),
                    title TEXT NOT NULL,
                    description TEXT,
                    scope TEXT,
                    notes TEXT,
                    review_interval INTEGER NOT NULL CHECK (review_interval IN (1, 2, 3, 5)),
                    last_review_date TEXT,
                    next_review_date TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('under_review', 'approved')),
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    modified_by TEXT,
                    modified_at TEXT,
                    version INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_assessments_category
                    ON risk_assessments(category_id);

                CREATE TABLE IF NOT EXISTS approvals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    assessment_id INTEGER NOT NULL REFERENCES risk_assessments(id),
                    approver_id TEXT NOT NULL,
                    approved_at TEXT NOT NULL,
                    notes TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_approvals_assessment
                    ON approvals(assessment_id, approved_at, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Row conversion helpers
// =============================================================================

/// Map a rusqlite error for `operation`, surfacing undecodable rows as corruption.
fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| match e {
        rusqlite::Error::FromSqlConversionFailure(column, _, cause) => {
            RepositoryError::corruption("row", format!("column {}: {}", column, cause))
        }
        other => RepositoryError::storage(operation, other.to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn timestamp_to_sql(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_from_row(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => timestamp_from_row(row, idx).map(Some),
    }
}

/// Audit columns in the order created_by, created_at, modified_by, modified_at.
fn audit_from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Audit> {
    Ok(Audit {
        created_by: Actor(row.get(first)?),
        created_at: timestamp_from_row(row, first + 1)?,
        modified_by: row.get::<_, Option<String>>(first + 2)?.map(Actor),
        modified_at: optional_timestamp_from_row(row, first + 3)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        audit: audit_from_row(row, 3)?,
    })
}

fn assessment_from_row(row: &Row<'_>) -> rusqlite::Result<RiskAssessment> {
    let years: u32 = row.get(6)?;
    let review_interval = ReviewInterval::try_from(years)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Integer, Box::new(e)))?;
    let status: String = row.get(9)?;
    let status = status
        .parse::<ReviewStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(RiskAssessment {
        id: AssessmentId(row.get(0)?),
        category_id: CategoryId(row.get(1)?),
        details: AssessmentDetails {
            title: row.get(2)?,
            description: row.get(3)?,
            scope: row.get(4)?,
            notes: row.get(5)?,
            review_interval,
        },
        last_review_date: row.get(7)?,
        next_review_date: row.get(8)?,
        status,
        audit: audit_from_row(row, 10)?,
        version: row.get(14)?,
    })
}

fn approval_from_row(row: &Row<'_>) -> rusqlite::Result<Approval> {
    Ok(Approval {
        id: ApprovalId(row.get(0)?),
        assessment_id: AssessmentId(row.get(1)?),
        approver_id: PersonId(row.get(2)?),
        approved_at: timestamp_from_row(row, 3)?,
        notes: row.get(4)?,
    })
}

fn category_exists(conn: &Connection, id: CategoryId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        params![id.0],
        |row| row.get(0),
    )
}

fn count_references(conn: &Connection, id: CategoryId) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM risk_assessments WHERE category_id = ?1",
        params![id.0],
        |row| row.get(0),
    )
}

/// Whether another category already uses `name` (ignoring case).
fn name_taken(
    conn: &Connection,
    name: &str,
    except: Option<CategoryId>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE name_key = ?1 AND id IS NOT ?2)",
        params![category_name_key(name), except.map(|id| id.0)],
        |row| row.get(0),
    )
}

/// Compare-and-swap write of an assessment row inside `tx`.
fn write_assessment(
    tx: &Transaction<'_>,
    assessment: &RiskAssessment,
    operation: &'static str,
) -> Result<RiskAssessment, RepositoryError> {
    let audit = &assessment.audit;
    let updated = tx
        .execute(
            "UPDATE risk_assessments SET
                 title = ?1, description = ?2, scope = ?3, notes = ?4,
                 review_interval = ?5, last_review_date = ?6, next_review_date = ?7,
                 status = ?8, modified_by = ?9, modified_at = ?10,
                 version = version + 1
             WHERE id = ?11 AND version = ?12",
            params![
                assessment.details.title,
                assessment.details.description,
                assessment.details.scope,
                assessment.details.notes,
                assessment.details.review_interval.years(),
                assessment.last_review_date,
                assessment.next_review_date,
                assessment.status.as_str(),
                audit.modified_by.as_ref().map(|a| a.0.as_str()),
                audit.modified_at.as_ref().map(timestamp_to_sql),
                assessment.id.0,
                assessment.version,
            ],
        )
        .map_err(sql_error(operation))?;

    if updated == 0 {
        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM risk_assessments WHERE id = ?1)",
                params![assessment.id.0],
                |row| row.get(0),
            )
            .map_err(sql_error(operation))?;
        return Err(if exists {
            RepositoryError::Conflict {
                id: assessment.id,
                expected_version: assessment.version,
            }
        } else {
            RepositoryError::assessment_not_found(assessment.id)
        });
    }

    let mut saved = assessment.clone();
    saved.version += 1;
    Ok(saved)
}

// =============================================================================
// AssessmentRepository trait implementation
// =============================================================================

#[async_trait]
impl AssessmentRepository for SqliteRepository {
    async fn insert_category(&self, draft: CategoryDraft) -> Result<Category, RepositoryError> {
        self.with_conn("insert_category", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("insert_category"))?;

            if name_taken(&tx, &draft.name, None).map_err(sql_error("insert_category"))? {
                return Err(RepositoryError::DuplicateCategoryName(draft.name));
            }

            tx.execute(
                "INSERT INTO categories (name, name_key, description, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    draft.name,
                    category_name_key(&draft.name),
                    draft.description,
                    draft.audit.created_by.0,
                    timestamp_to_sql(&draft.audit.created_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::DuplicateCategoryName(draft.name.clone())
                } else {
                    sql_error("insert_category")(e)
                }
            })?;
            let id = CategoryId(tx.last_insert_rowid());
            tx.commit().map_err(sql_error("insert_category"))?;

            Ok(Category {
                id,
                name: draft.name,
                description: draft.description,
                audit: draft.audit,
            })
        })
        .await
    }

    async fn update_category(&self, category: &Category) -> Result<Category, RepositoryError> {
        let category = category.clone();
        self.with_conn("update_category", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("update_category"))?;

            if !category_exists(&tx, category.id).map_err(sql_error("update_category"))? {
                return Err(RepositoryError::category_not_found(category.id));
            }
            if name_taken(&tx, &category.name, Some(category.id))
                .map_err(sql_error("update_category"))?
            {
                return Err(RepositoryError::DuplicateCategoryName(category.name));
            }

            tx.execute(
                "UPDATE categories SET name = ?1, name_key = ?2, description = ?3,
                     modified_by = ?4, modified_at = ?5
                 WHERE id = ?6",
                params![
                    category.name,
                    category_name_key(&category.name),
                    category.description,
                    category.audit.modified_by.as_ref().map(|a| a.0.as_str()),
                    category.audit.modified_at.as_ref().map(timestamp_to_sql),
                    category.id.0,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::DuplicateCategoryName(category.name.clone())
                } else {
                    sql_error("update_category")(e)
                }
            })?;
            tx.commit().map_err(sql_error("update_category"))?;
            Ok(category)
        })
        .await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        self.with_conn("delete_category", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("delete_category"))?;

            if !category_exists(&tx, id).map_err(sql_error("delete_category"))? {
                return Err(RepositoryError::category_not_found(id));
            }
            let count = count_references(&tx, id).map_err(sql_error("delete_category"))?;
            if count > 0 {
                return Err(RepositoryError::CategoryInUse { id, count });
            }

            tx.execute("DELETE FROM categories WHERE id = ?1", params![id.0])
                .map_err(sql_error("delete_category"))?;
            tx.commit().map_err(sql_error("delete_category"))?;
            Ok(())
        })
        .await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        self.with_conn("get_category", move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![id.0],
                category_from_row,
            )
            .optional()
            .map_err(sql_error("get_category"))
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.with_conn("list_categories", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM categories ORDER BY name_key, id",
                    CATEGORY_COLUMNS
                ))
                .map_err(sql_error("list_categories"))?;
            let rows = stmt
                .query_map([], category_from_row)
                .map_err(sql_error("list_categories"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error("list_categories"))
        })
        .await
    }

    async fn count_assessments_in_category(
        &self,
        id: CategoryId,
    ) -> Result<usize, RepositoryError> {
        self.with_conn("count_assessments_in_category", move |conn| {
            count_references(conn, id).map_err(sql_error("count_assessments_in_category"))
        })
        .await
    }

    async fn insert_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<RiskAssessment, RepositoryError> {
        self.with_conn("insert_assessment", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("insert_assessment"))?;

            if !category_exists(&tx, draft.category_id).map_err(sql_error("insert_assessment"))? {
                return Err(RepositoryError::category_not_found(draft.category_id));
            }

            tx.execute(
                "INSERT INTO risk_assessments (
                     category_id, title, description, scope, notes, review_interval,
                     last_review_date, next_review_date, status, created_by, created_at, version
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
                params![
                    draft.category_id.0,
                    draft.details.title,
                    draft.details.description,
                    draft.details.scope,
                    draft.details.notes,
                    draft.details.review_interval.years(),
                    draft.last_review_date,
                    draft.next_review_date,
                    draft.status.as_str(),
                    draft.audit.created_by.0,
                    timestamp_to_sql(&draft.audit.created_at),
                ],
            )
            .map_err(sql_error("insert_assessment"))?;
            let id = AssessmentId(tx.last_insert_rowid());
            tx.commit().map_err(sql_error("insert_assessment"))?;

            debug!("Inserted risk assessment {}", id);
            Ok(draft.into_assessment(id))
        })
        .await
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<RiskAssessment>, RepositoryError> {
        self.with_conn("get_assessment", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM risk_assessments WHERE id = ?1",
                    ASSESSMENT_COLUMNS
                ),
                params![id.0],
                assessment_from_row,
            )
            .optional()
            .map_err(sql_error("get_assessment"))
        })
        .await
    }

    async fn list_assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError> {
        self.with_conn("list_assessments", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM risk_assessments ORDER BY id",
                    ASSESSMENT_COLUMNS
                ))
                .map_err(sql_error("list_assessments"))?;
            let rows = stmt
                .query_map([], assessment_from_row)
                .map_err(sql_error("list_assessments"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error("list_assessments"))
        })
        .await
    }

    async fn save_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<RiskAssessment, RepositoryError> {
        let assessment = assessment.clone();
        self.with_conn("save_assessment", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("save_assessment"))?;
            let saved = write_assessment(&tx, &assessment, "save_assessment")?;
            tx.commit().map_err(sql_error("save_assessment"))?;
            Ok(saved)
        })
        .await
    }

    async fn list_approvals(&self, id: AssessmentId) -> Result<Vec<Approval>, RepositoryError> {
        self.with_conn("list_approvals", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM approvals WHERE assessment_id = ?1
                     ORDER BY approved_at, id",
                    APPROVAL_COLUMNS
                ))
                .map_err(sql_error("list_approvals"))?;
            let rows = stmt
                .query_map(params![id.0], approval_from_row)
                .map_err(sql_error("list_approvals"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error("list_approvals"))
        })
        .await
    }

    async fn approval_counts(&self) -> Result<HashMap<AssessmentId, usize>, RepositoryError> {
        self.with_conn("approval_counts", |conn| {
            let mut stmt = conn
                .prepare("SELECT assessment_id, COUNT(*) FROM approvals GROUP BY assessment_id")
                .map_err(sql_error("approval_counts"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((AssessmentId(row.get(0)?), row.get::<_, usize>(1)?))
                })
                .map_err(sql_error("approval_counts"))?;
            rows.collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(sql_error("approval_counts"))
        })
        .await
    }

    async fn record_approvals(
        &self,
        assessment: &RiskAssessment,
        approvals: Vec<ApprovalDraft>,
    ) -> Result<(RiskAssessment, Vec<Approval>), RepositoryError> {
        let assessment = assessment.clone();
        self.with_conn("record_approvals", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("record_approvals"))?;

            let saved = write_assessment(&tx, &assessment, "record_approvals")?;

            let mut inserted = Vec::with_capacity(approvals.len());
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO approvals (assessment_id, approver_id, approved_at, notes)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(sql_error("record_approvals"))?;
                for draft in approvals {
                    let id = stmt
                        .insert(params![
                            assessment.id.0,
                            draft.approver_id.0,
                            timestamp_to_sql(&draft.approved_at),
                            draft.notes,
                        ])
                        .map_err(sql_error("record_approvals"))?;
                    inserted.push(Approval {
                        id: ApprovalId(id),
                        assessment_id: assessment.id,
                        approver_id: draft.approver_id,
                        approved_at: draft.approved_at,
                        notes: draft.notes,
                    });
                }
            }

            tx.commit().map_err(sql_error("record_approvals"))?;
            Ok((saved, inserted))
        })
        .await
    }

    async fn restart_review(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<(RiskAssessment, usize), RepositoryError> {
        let assessment = assessment.clone();
        self.with_conn("restart_review", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("restart_review"))?;

            let saved = write_assessment(&tx, &assessment, "restart_review")?;
            let cleared = tx
                .execute(
                    "DELETE FROM approvals WHERE assessment_id = ?1",
                    params![assessment.id.0],
                )
                .map_err(sql_error("restart_review"))?;

            tx.commit().map_err(sql_error("restart_review"))?;
            Ok((saved, cleared))
        })
        .await
    }
}
