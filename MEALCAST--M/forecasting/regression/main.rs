//! Per-meal random forest regression: model, validation helpers and reporting.

/// Forest model wrapper and count post-processing.
pub mod forest;
/// Splits, folds and error metrics.
pub mod func;
/// Training metrics and report types.
pub mod reporter;

use crate::{
    dataset::PreparedDataset,
    errors::ForecastResult,
    schema::{FeatureSchema, Meal},
};

use forest::{ForestParams, MealRegressor};
use func::{k_fold, mean_absolute_error, r2_score, root_mean_squared_error, select, Split};
use reporter::MealMetrics;

/// Number of cross-validation folds.
pub const CV_FOLDS: usize = 5;

/// Fits and evaluates one meal regressor against a fixed split.
#[derive(Debug, Clone, Copy)]
pub struct MealTrainer {
    params: ForestParams,
}

impl Default for MealTrainer {
    fn default() -> Self {
        Self::new(ForestParams::DEFAULT)
    }
}

impl MealTrainer {
    /// Creates a trainer with the given hyperparameters.
    #[must_use]
    pub const fn new(params: ForestParams) -> Self {
        Self { params }
    }

    /// Hyperparameters in use.
    #[must_use]
    pub const fn params(&self) -> ForestParams {
        self.params
    }

    /// Fits on the train partition, scores both partitions and cross-validates
    /// on the whole dataset.
    pub fn train(
        &self,
        meal: Meal,
        schema: &FeatureSchema,
        dataset: &PreparedDataset,
        split: &Split,
    ) -> ForecastResult<(MealRegressor, MealMetrics)> {
        let rows = dataset.rows(schema)?;
        let targets = dataset.targets(meal);

        let train_rows = select(&rows, &split.train);
        let train_targets = select(&targets, &split.train);
        let test_rows = select(&rows, &split.test);
        let test_targets = select(&targets, &split.test);

        let model = MealRegressor::fit(meal, schema, &train_rows, &train_targets, self.params)?;
        let train_pred = model.predict(&train_rows)?;
        let test_pred = model.predict(&test_rows)?;
        let cv_mae = self.cross_validate(meal, schema, &rows, &targets)?;

        let metrics = MealMetrics {
            meal,
            train_rows: train_rows.len(),
            test_rows: test_rows.len(),
            mae_train: mean_absolute_error(&train_pred, &train_targets),
            mae_test: mean_absolute_error(&test_pred, &test_targets),
            rmse_test: root_mean_squared_error(&test_pred, &test_targets),
            r2_train: r2_score(&train_pred, &train_targets),
            r2_test: r2_score(&test_pred, &test_targets),
            cv_mae,
        };
        Ok((model, metrics))
    }

    fn cross_validate(
        &self,
        meal: Meal,
        schema: &FeatureSchema,
        rows: &[Vec<f64>],
        targets: &[f64],
    ) -> ForecastResult<f64> {
        let folds = k_fold(rows.len(), CV_FOLDS);
        let mut total = 0.0;
        for fold in &folds {
            let model = MealRegressor::fit(
                meal,
                schema,
                &select(rows, &fold.train),
                &select(targets, &fold.train),
                self.params,
            )?;
            let predictions = model.predict(&select(rows, &fold.test))?;
            total += mean_absolute_error(&predictions, &select(targets, &fold.test));
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = total / folds.len() as f64;
        Ok(mean)
    }
}
