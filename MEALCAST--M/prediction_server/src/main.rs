pub mod app;
pub mod handler;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use mealcast_forecasting::{ArtifactStore, InferenceService, MealcastConfig};
use serde_json::json;
use shared_logging::LogLevel;

use crate::app::AppState;

#[derive(Parser, Debug)]
#[command(name = "mealcast-server", version, about = "Serves Mealcast attendance forecasts")]
struct Args {
    /// Config file (defaults to ./mealcast.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overrides `[server].bind`.
    #[arg(long)]
    bind: Option<String>,
    /// Artifact directory, overrides `[paths].artifacts`.
    #[arg(long)]
    artifacts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = MealcastConfig::discover(args.config.as_deref())?;
    let telemetry = config.telemetry("prediction_server")?;

    let store = ArtifactStore::new(args.artifacts.unwrap_or_else(|| config.artifacts_dir()));
    let service = InferenceService::load(&store)
        .with_context(|| format!("loading models from {}", store.dir().display()))?
        .with_telemetry(telemetry.clone());

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState {
        service: Arc::new(service),
    };
    let app = app::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;

    telemetry.log(LogLevel::Info, "server_listening", json!({ "bind": bind }))?;
    axum::serve(listener, app).await?;

    Ok(())
}
