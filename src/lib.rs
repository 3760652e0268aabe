pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod jobs;
pub mod model;
pub mod reference;
pub mod telemetry;
pub mod training;
pub mod types;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
