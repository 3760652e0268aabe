use anyhow::Context;
use clap::Parser;
use laptime_service::{
    model::ForestParams,
    telemetry::CsvCacheProvider,
    training::{collect, train},
};
use std::path::PathBuf;

/// Builds the lap-time model from cached race sessions of every known circuit.
#[derive(Parser, Debug)]
#[command(name = "train")]
struct Args {
    /// Root of the session cache (`{year}/{circuit}/R/laps.csv`).
    #[arg(long, env = "FASTF1_CACHE", default_value = "fastf1_cache")]
    cache_dir: PathBuf,
    #[arg(long, default_value_t = 2024)]
    year: i32,
    #[arg(long, env = "MODEL_PATH", default_value = "lap_predictor.json")]
    output: PathBuf,
    #[arg(long, default_value_t = 300)]
    trees: u16,
    #[arg(long, default_value_t = 15)]
    max_depth: u16,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    laptime_service::init_logging();
    let args = Args::parse();

    let provider = CsvCacheProvider::new(args.cache_dir.clone());
    let data = collect(&provider, args.year).await?;
    tracing::info!(rows = data.len(), "dataset assembled");

    let params = ForestParams {
        n_trees: args.trees,
        max_depth: args.max_depth,
        seed: args.seed,
    };
    // Fitting is CPU-bound; keep it off the async workers.
    let (model, report) = tokio::task::spawn_blocking(move || train(&data, params))
        .await
        .context("training task panicked")??;
    tracing::info!(
        train = report.train_rows,
        test = report.test_rows,
        "MAE: {:.2} seconds",
        report.mae
    );

    model.save(&args.output)?;
    tracing::info!(path = %args.output.display(), "model saved");
    Ok(())
}
