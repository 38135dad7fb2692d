use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dataset::DatasetSummary, regression::forest::ForestParams, schema::Meal};

/// Validation metrics for one meal regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealMetrics {
    /// Target meal.
    pub meal: Meal,
    /// Rows in the training partition.
    pub train_rows: usize,
    /// Rows in the test partition.
    pub test_rows: usize,
    /// MAE on the training partition.
    pub mae_train: f64,
    /// MAE on the test partition.
    pub mae_test: f64,
    /// RMSE on the test partition.
    pub rmse_test: f64,
    /// R² on the training partition.
    pub r2_train: f64,
    /// R² on the test partition.
    pub r2_test: f64,
    /// Mean MAE over the cross-validation folds.
    pub cv_mae: f64,
}

impl MealMetrics {
    /// One-line summary for console output.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[{}] mae_test={:.2} r2_test={:.3} rmse_test={:.2} cv_mae={:.2} (train={} test={})",
            self.meal,
            self.mae_test,
            self.r2_test,
            self.rmse_test,
            self.cv_mae,
            self.train_rows,
            self.test_rows
        )
    }
}

/// Full outcome of a training run, persisted next to the models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Completion time.
    pub trained_at: DateTime<Utc>,
    /// Seed used for the split and the forests.
    pub seed: u64,
    /// Forest hyperparameters.
    pub params: ForestParams,
    /// Dataset preparation statistics.
    pub dataset: DatasetSummary,
    /// Per-meal metrics in [`Meal::ALL`] order.
    pub metrics: Vec<MealMetrics>,
}

impl TrainingReport {
    /// Metrics for one meal.
    #[must_use]
    pub fn meal(&self, meal: Meal) -> Option<&MealMetrics> {
        self.metrics.iter().find(|metrics| metrics.meal == meal)
    }

    /// Renders `meal,mae_test,r2_test,cv_mae` rows.
    pub fn metrics_csv(&self) -> csv::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["meal", "mae_test", "r2_test", "cv_mae"])?;
        for metrics in &self.metrics {
            writer.write_record([
                metrics.meal.as_str().to_string(),
                format!("{:.4}", metrics.mae_test),
                format!("{:.4}", metrics.r2_test),
                format!("{:.4}", metrics.cv_mae),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))
    }
}
