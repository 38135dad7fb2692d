use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mealcast_forecasting::{
    ArtifactStore, CalendarInput, DatasetPreparer, ForecastTelemetry, InferenceService,
    MealcastConfig, PredictionRequest, StaffingAdvisory, TrainingOrchestrator,
};
use serde_json::json;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Mealcast training and forecasting CLI")]
struct Cli {
    /// Config file (defaults to ./mealcast.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains the three meal models and publishes the artifacts.
    Train {
        /// Historical attendance CSV.
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Artifact directory.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
    /// Forecasts one day with the published artifacts.
    Predict(PredictArgs),
    /// Prints the persisted metrics table.
    Metrics {
        /// Artifact directory.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
    /// Prepares the dataset and prints its summary without training.
    Inspect {
        /// Historical attendance CSV.
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// ISO weekday, Monday = 1.
    #[arg(long)]
    weekday: u32,
    /// Day of month.
    #[arg(long)]
    day: u32,
    /// Month, 1-12.
    #[arg(long)]
    month: u32,
    /// Calendar year.
    #[arg(long)]
    year: i32,
    /// Marks the day as a weekend.
    #[arg(long)]
    weekend: bool,
    /// Marks the day as a public holiday.
    #[arg(long)]
    holiday: bool,
    /// Artifact directory.
    #[arg(long)]
    artifacts: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MealcastConfig::discover(cli.config.as_deref())?;
    match cli.command {
        Commands::Train { dataset, artifacts } => handle_train(&config, dataset, artifacts),
        Commands::Predict(args) => handle_predict(&config, args),
        Commands::Metrics { artifacts } => {
            let store = ArtifactStore::new(artifacts.unwrap_or_else(|| config.artifacts_dir()));
            print!("{}", store.read_metrics()?);
            Ok(())
        }
        Commands::Inspect { dataset } => {
            let dataset = dataset.unwrap_or_else(|| config.dataset_path());
            let prepared = DatasetPreparer.load(&dataset)?;
            println!("{}", serde_json::to_string_pretty(prepared.summary())?);
            Ok(())
        }
    }
}

fn handle_train(
    config: &MealcastConfig,
    dataset: Option<PathBuf>,
    artifacts: Option<PathBuf>,
) -> Result<()> {
    let dataset = dataset.unwrap_or_else(|| config.dataset_path());
    let store = ArtifactStore::new(artifacts.unwrap_or_else(|| config.artifacts_dir()));
    let telemetry = config.telemetry("trainer")?;
    telemetry.log(
        LogLevel::Info,
        "training_requested",
        json!({ "dataset": dataset, "artifacts": store.dir() }),
    )?;

    let report = TrainingOrchestrator::new()
        .with_telemetry(telemetry)
        .run(&dataset, &store)
        .with_context(|| format!("training on {}", dataset.display()))?;

    for metrics in &report.metrics {
        println!("{}", metrics.summary());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "event": "training_completed",
            "run_id": report.run_id,
            "rows_kept": report.dataset.rows_kept,
            "rows_dropped": report.dataset.rows_dropped,
            "artifacts": store.dir(),
        }))?
    );
    Ok(())
}

fn handle_predict(config: &MealcastConfig, args: PredictArgs) -> Result<()> {
    let store = ArtifactStore::new(args.artifacts.unwrap_or_else(|| config.artifacts_dir()));
    let service = InferenceService::load(&store)?.with_telemetry(cli_telemetry(config)?);
    let request = PredictionRequest::from(CalendarInput {
        weekday: args.weekday,
        day: args.day,
        month: args.month,
        year: args.year,
        weekend: args.weekend,
        holiday: args.holiday,
    });
    let prediction = service.predict(&request)?;
    let advisory = StaffingAdvisory::for_prediction(&prediction);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "prediction": prediction,
            "advisory": advisory,
        }))?
    );
    Ok(())
}

fn cli_telemetry(config: &MealcastConfig) -> Result<ForecastTelemetry> {
    config.telemetry("trn")
}
