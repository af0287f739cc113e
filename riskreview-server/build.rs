fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through RISKREVIEW_GIT_HASH from release build environments
    println!("cargo:rerun-if-env-changed=RISKREVIEW_GIT_HASH");
    if let Ok(hash) = std::env::var("RISKREVIEW_GIT_HASH") {
        println!("cargo:rustc-env=RISKREVIEW_GIT_HASH={}", hash);
    }
}
