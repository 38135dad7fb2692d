#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Mealcast forecasting stack: calendar features, dataset preparation,
//! per-meal random forests, training orchestration and inference.

/// Error taxonomy.
#[path = "../errors.rs"]
pub mod errors;

/// Calendar feature derivation.
#[path = "../features.rs"]
pub mod features;

/// Meals and the persisted feature schema.
#[path = "../schema.rs"]
pub mod schema;

/// Historical export loading and cleaning.
#[path = "../dataset.rs"]
pub mod dataset;

/// Per-meal regression models and metrics.
#[path = "../regression/main.rs"]
pub mod regression;

/// Artifact directory layout and publication.
#[path = "../artifacts.rs"]
pub mod artifacts;

/// Batch training orchestration.
#[path = "../training.rs"]
pub mod training;

/// Startup-loaded prediction service.
#[path = "../inference.rs"]
pub mod inference;

/// Kitchen planning hints for a forecast.
#[path = "../advisory.rs"]
pub mod advisory;

/// Workspace configuration file.
#[path = "../config.rs"]
pub mod config;

/// Structured logging and event helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use advisory::{LoadLevel, StaffingAdvisory};
pub use artifacts::ArtifactStore;
pub use config::MealcastConfig;
pub use dataset::{CalendarRecord, DatasetPreparer, DatasetSummary, PreparedDataset};
pub use errors::{ForecastError, ForecastResult};
pub use features::{derive, CalendarInput, FeatureVector, FEATURE_NAMES};
pub use inference::{InferenceService, PredictionRequest, PredictionResult, ServiceStatus};
pub use regression::{
    forest::{ForestParams, MealRegressor},
    reporter::{MealMetrics, TrainingReport},
};
pub use schema::{FeatureSchema, Meal};
pub use telemetry::{ForecastTelemetry, ForecastTelemetryBuilder};
pub use training::{TrainingOrchestrator, TrainingOutcome};
