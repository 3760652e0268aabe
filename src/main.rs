use laptime_service::{
    api::{build_router, AppState},
    config::AppConfig,
    features::{build_row, PredictRequest},
    jobs::{AnalyticsRunner, JobStore},
    model::Predictor,
    telemetry::CsvCacheProvider,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    laptime_service::init_logging();

    // ---------- Config ----------
    let cfg = AppConfig::from_env()?;
    tracing::info!(?cfg, "starting");

    // ---------- Model ----------
    // Missing or skewed artifact: serve without a model
    let predictor = Predictor::load(&cfg.model_path);
    if predictor.is_loaded() {
        // Warmup on a default Monaco row
        let sample = build_row(&PredictRequest {
            track: Some("Monaco".to_string()),
            ..PredictRequest::default()
        })?;
        match predictor.predict(&sample) {
            Ok(p) => tracing::info!(prediction = p, "warmup prediction ok"),
            Err(e) => tracing::warn!(error = %e, "warmup prediction failed"),
        }
    }

    // ---------- Jobs ----------
    let provider = Arc::new(CsvCacheProvider::new(cfg.cache_dir.clone()));
    let runner = Arc::new(AnalyticsRunner::new(provider, cfg.analytics_timeout));
    let state = AppState {
        predictor: Arc::new(predictor),
        jobs: Arc::new(JobStore::new(runner, cfg.poll_interval)),
    };

    // ---------- Server ----------
    let app = build_router(state);
    let addr = cfg.bind_addr();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
