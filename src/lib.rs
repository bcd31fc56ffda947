pub mod config;
pub mod db;
pub mod executor;
pub mod key_index;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod runner;
pub mod survey;

/// Install the compact `RUST_LOG`-driven subscriber shared by all binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}
