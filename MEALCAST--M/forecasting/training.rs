use std::path::Path;

use chrono::Utc;
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    artifacts::ArtifactStore,
    dataset::{DatasetPreparer, PreparedDataset},
    errors::{ForecastError, ForecastResult},
    regression::{
        forest::MealRegressor,
        func::train_test_split,
        reporter::{MealMetrics, TrainingReport},
        MealTrainer,
    },
    schema::{FeatureSchema, Meal},
    telemetry::{self, ForecastTelemetry},
};

/// Seed shared by the split and the forests.
pub const SEED: u64 = 42;
/// Share of rows held out for testing.
pub const TEST_RATIO: f64 = 0.2;
/// Fewer usable rows than this abort the run.
pub const MIN_TRAINING_ROWS: usize = 10;

/// Models and report of a finished run, before publication.
#[derive(Debug)]
pub struct TrainingOutcome {
    /// Feature order every model was fitted on.
    pub schema: FeatureSchema,
    /// One model per meal, in [`Meal::ALL`] order.
    pub models: Vec<MealRegressor>,
    /// Metrics and dataset statistics.
    pub report: TrainingReport,
}

/// Batch job turning a historical export into published artifacts.
#[derive(Debug, Default)]
pub struct TrainingOrchestrator {
    preparer: DatasetPreparer,
    trainer: MealTrainer,
    telemetry: Option<ForecastTelemetry>,
}

impl TrainingOrchestrator {
    /// Orchestrator with the production hyperparameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Prepares `dataset_path`, trains every meal and publishes the artifacts.
    /// Nothing is written unless all three meals train successfully.
    pub fn run(&self, dataset_path: &Path, store: &ArtifactStore) -> ForecastResult<TrainingReport> {
        let result = Self::check_layout(dataset_path, store)
            .and_then(|()| self.preparer.load(dataset_path))
            .and_then(|dataset| self.train(&dataset))
            .and_then(|outcome| {
                store.publish(&outcome.schema, &outcome.models, &outcome.report)?;
                Ok(outcome.report)
            });
        match &result {
            Ok(report) => {
                self.log(
                    LogLevel::Info,
                    "training_published",
                    json!({ "run_id": report.run_id, "artifacts": store.dir() }),
                );
                self.event(
                    "forecast.training.completed",
                    json!({ "run_id": report.run_id, "metrics": report.metrics }),
                );
            }
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "training_aborted",
                    json!({ "dataset": dataset_path, "error": err.to_string() }),
                );
                self.event(
                    "forecast.training.failed",
                    json!({ "dataset": dataset_path, "error": err.to_string() }),
                );
            }
        }
        result
    }

    /// Trains the three meal regressors on an already prepared dataset.
    pub fn train(&self, dataset: &PreparedDataset) -> ForecastResult<TrainingOutcome> {
        let summary = dataset.summary();
        self.log(
            LogLevel::Info,
            "dataset_prepared",
            json!({
                "rows_read": summary.rows_read,
                "rows_kept": summary.rows_kept,
                "rows_dropped": summary.rows_dropped,
                "has_date_column": summary.has_date_column,
            }),
        );
        if summary.total_mismatches > 0 {
            self.log(
                LogLevel::Warn,
                "total_mismatch",
                json!({ "rows": summary.total_mismatches }),
            );
        }
        if dataset.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::DataLoad {
                path: "<prepared dataset>".into(),
                reason: format!(
                    "{} usable rows, at least {MIN_TRAINING_ROWS} required",
                    dataset.len()
                ),
            });
        }

        let schema = FeatureSchema::canonical();
        let split = train_test_split(dataset.len(), TEST_RATIO, SEED);
        let run_id = Uuid::new_v4();
        self.event(
            "forecast.training.started",
            json!({ "run_id": run_id, "rows": dataset.len(), "test_rows": split.test.len() }),
        );

        let mut models = Vec::with_capacity(Meal::ALL.len());
        let mut metrics: Vec<MealMetrics> = Vec::with_capacity(Meal::ALL.len());
        for meal in Meal::ALL {
            let (model, meal_metrics) = self.trainer.train(meal, &schema, dataset, &split)?;
            self.log(
                LogLevel::Info,
                "meal_trained",
                json!({
                    "meal": meal,
                    "mae_test": meal_metrics.mae_test,
                    "r2_test": meal_metrics.r2_test,
                    "cv_mae": meal_metrics.cv_mae,
                }),
            );
            models.push(model);
            metrics.push(meal_metrics);
        }

        let report = TrainingReport {
            run_id,
            trained_at: Utc::now(),
            seed: SEED,
            params: self.trainer.params(),
            dataset: summary.clone(),
            metrics,
        };
        Ok(TrainingOutcome {
            schema,
            models,
            report,
        })
    }

    fn check_layout(dataset_path: &Path, store: &ArtifactStore) -> ForecastResult<()> {
        if store.contains(dataset_path) {
            return Err(ForecastError::Persist {
                path: store.dir().to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "artifact directory contains the dataset {}",
                        dataset_path.display()
                    ),
                ),
            });
        }
        Ok(())
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        telemetry::log(self.telemetry.as_ref(), level, message, metadata);
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) {
        telemetry::event(self.telemetry.as_ref(), event_type, payload);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fmt::Write;

    /// Eight weeks of synthetic attendance: busy weekdays, quiet weekends,
    /// very quiet holidays, plus two closed days.
    pub(crate) fn attendance_csv() -> String {
        let mut csv = String::from(
            "weekday,month,year,holiday,weekend,breakfast,lunch,dinner,total,date\n",
        );
        let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        for offset in 0..56 {
            let date = start + chrono::Duration::days(offset);
            let weekday = chrono::Datelike::weekday(&date).number_from_monday();
            let weekend = weekday >= 6;
            let holiday = offset == 17 || offset == 38;
            let (breakfast, lunch, dinner) = if holiday {
                (15, 40, 25)
            } else if weekend {
                (40, 110, 70)
            } else {
                (150 + weekday * 3, 380 + weekday * 5, 220 + weekday * 2)
            };
            let total = if offset == 20 || offset == 45 {
                0
            } else {
                breakfast + lunch + dinner
            };
            writeln!(
                csv,
                "{weekday},{},{},{},{},{breakfast},{lunch},{dinner},{total},{}",
                chrono::Datelike::month(&date),
                chrono::Datelike::year(&date),
                u8::from(holiday),
                u8::from(weekend),
                date.format("%d/%m/%Y"),
            )
            .unwrap();
        }
        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::SCHEMA_FILE;
    use std::fs;
    use tempfile::tempdir;

    fn write_fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("attendance.csv");
        fs::write(&path, fixtures::attendance_csv()).unwrap();
        path
    }

    #[test]
    fn run_publishes_every_artifact() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let report = TrainingOrchestrator::new().run(&dataset, &store).unwrap();

        assert_eq!(report.dataset.rows_kept, 54);
        assert_eq!(report.metrics.len(), 3);
        for meal in Meal::ALL {
            assert!(store.model_path(meal).exists());
        }
        assert_eq!(
            fs::read_to_string(store.schema_path()).unwrap(),
            FeatureSchema::canonical().to_line()
        );
        assert!(store
            .read_metrics()
            .unwrap()
            .starts_with("meal,mae_test,r2_test,cv_mae"));
        assert_eq!(store.load_report().unwrap().run_id, report.run_id);
    }

    #[test]
    fn republishing_replaces_the_previous_set() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let orchestrator = TrainingOrchestrator::new();
        orchestrator.run(&dataset, &store).unwrap();
        let second = orchestrator.run(&dataset, &store).unwrap();

        assert_eq!(store.load_report().unwrap().run_id, second.run_id);
        let mut names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "features_list.txt",
                "metrics.csv",
                "model_breakfast.json",
                "model_dinner.json",
                "model_lunch.json",
                "training_report.json",
            ]
        );
    }

    #[test]
    fn dataset_inside_the_artifact_dir_is_refused() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        let dataset = write_fixture(&data);
        fs::write(data.join("notes.txt"), "keep me").unwrap();

        let err = TrainingOrchestrator::new()
            .run(&dataset, &ArtifactStore::new(&data))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Persist { .. }), "{err}");
        assert_eq!(fs::read_to_string(&dataset).unwrap(), fixtures::attendance_csv());
        assert_eq!(fs::read_to_string(data.join("notes.txt")).unwrap(), "keep me");
    }

    #[test]
    fn foreign_files_block_publication() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.schema_path(), "weekday").unwrap();
        fs::write(store.dir().join("notes.txt"), "keep me").unwrap();

        let err = TrainingOrchestrator::new().run(&dataset, &store).unwrap_err();
        match err {
            ForecastError::Persist { path, .. } => assert!(path.ends_with("notes.txt")),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(fs::read_to_string(store.schema_path()).unwrap(), "weekday");
        assert_eq!(
            fs::read_to_string(store.dir().join("notes.txt")).unwrap(),
            "keep me"
        );
        assert!(!store.model_path(Meal::Lunch).exists());
    }

    #[test]
    fn current_dir_store_is_resolved_not_rejected() {
        // the test binary runs from the crate root, which holds sources
        let dir = tempdir().unwrap();
        let dataset = write_fixture(dir.path());
        let store = ArtifactStore::new(".");
        let err = TrainingOrchestrator::new().run(&dataset, &store).unwrap_err();
        match err {
            ForecastError::Persist { path, .. } => {
                assert!(path.is_absolute(), "{}", path.display());
                assert!(path.exists());
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(Path::new("Cargo.toml").exists());
        assert!(!Path::new(SCHEMA_FILE).exists());
    }

    #[test]
    fn training_is_reproducible() {
        let dir = tempdir().unwrap();
        let dataset = DatasetPreparer.load(&write_fixture(dir.path())).unwrap();
        let orchestrator = TrainingOrchestrator::new();
        let first = orchestrator.train(&dataset).unwrap().report;
        let second = orchestrator.train(&dataset).unwrap().report;
        for (a, b) in first.metrics.iter().zip(&second.metrics) {
            assert!((a.mae_test - b.mae_test).abs() < 1e-9);
            assert!((a.cv_mae - b.cv_mae).abs() < 1e-9);
        }
    }

    #[test]
    fn schema_failure_leaves_previous_artifacts_alone() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.schema_path(), "weekday").unwrap();

        let broken = dir.path().join("broken.csv");
        fs::write(&broken, "weekday,month\n1,2\n").unwrap();
        let err = TrainingOrchestrator::new().run(&broken, &store).unwrap_err();
        assert!(matches!(err, ForecastError::Schema { .. }));
        assert_eq!(fs::read_to_string(store.schema_path()).unwrap(), "weekday");
    }

    #[test]
    fn missing_dataset_aborts_without_artifacts() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let err = TrainingOrchestrator::new()
            .run(&dir.path().join("absent.csv"), &store)
            .unwrap_err();
        assert!(matches!(err, ForecastError::DataLoad { .. }));
        assert!(!store.dir().exists());
    }

    #[test]
    fn too_few_rows_are_rejected() {
        let csv = "weekday,month,year,holiday,weekend,breakfast,lunch,dinner,total\n\
                   1,2,2025,0,0,100,200,100,400\n";
        let dataset = DatasetPreparer
            .prepare_from_reader(std::io::Cursor::new(csv), Path::new("tiny.csv"))
            .unwrap();
        assert!(TrainingOrchestrator::new().train(&dataset).is_err());
    }
}
