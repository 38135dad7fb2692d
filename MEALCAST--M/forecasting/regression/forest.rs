use std::fmt;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smartcore::{
    ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters},
    linalg::basic::matrix::DenseMatrix,
};

use crate::{
    errors::{ForecastError, ForecastResult},
    schema::{FeatureSchema, Meal},
};

/// One bagged tree: a single-tree smartcore forest over dense `f64` rows, so it
/// draws its own bootstrap sample and its own feature subsets per split.
pub type Tree = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random forest hyperparameters. Fixed for every meal and every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Trees in the ensemble.
    pub n_trees: usize,
    /// Maximum tree depth.
    pub max_depth: u16,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples per leaf.
    pub min_samples_leaf: usize,
    /// Features drawn at each split.
    pub max_features: usize,
    /// Root seed; every tree gets its own seed drawn from it.
    pub seed: u64,
}

impl ForestParams {
    /// Production hyperparameters: 200 trees, depth 20, sqrt(8) features per split.
    pub const DEFAULT: Self = Self {
        n_trees: 200,
        max_depth: 20,
        min_samples_split: 3,
        min_samples_leaf: 2,
        max_features: 2,
        seed: 42,
    };

    /// Per-tree seeds, reproducible from [`Self::seed`].
    fn tree_seeds(self) -> Vec<u64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        (0..self.n_trees).map(|_| rng.next_u64()).collect()
    }

    fn tree_params(self, seed: u64) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters::default()
            .with_n_trees(1)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_m(self.max_features)
            .with_seed(seed)
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Trained forest for one meal, together with the feature order it was fitted on.
#[derive(Serialize, Deserialize)]
pub struct MealRegressor {
    meal: Meal,
    feature_names: Vec<String>,
    params: ForestParams,
    trained_rows: usize,
    trees: Vec<Tree>,
}

impl fmt::Debug for MealRegressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MealRegressor")
            .field("meal", &self.meal)
            .field("feature_names", &self.feature_names)
            .field("params", &self.params)
            .field("trained_rows", &self.trained_rows)
            .field("trees", &self.trees.len())
            .finish()
    }
}

impl MealRegressor {
    /// Fits a forest on rows laid out in `schema` order.
    pub fn fit(
        meal: Meal,
        schema: &FeatureSchema,
        rows: &[Vec<f64>],
        targets: &[f64],
        params: ForestParams,
    ) -> ForecastResult<Self> {
        let failure = |reason: String| ForecastError::Training {
            meal: meal.to_string(),
            reason,
        };
        if rows.is_empty() {
            return Err(failure("no training rows".into()));
        }
        if rows.len() != targets.len() {
            return Err(failure(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(failure("forest needs at least one tree".into()));
        }
        let x = dense(rows, schema.len()).map_err(failure)?;
        let y = targets.to_vec();
        let trees = params
            .tree_seeds()
            .into_iter()
            .map(|seed| Tree::fit(&x, &y, params.tree_params(seed)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| failure(err.to_string()))?;
        Ok(Self {
            meal,
            feature_names: schema.names().to_vec(),
            params,
            trained_rows: rows.len(),
            trees,
        })
    }

    /// Raw forest output (mean over trees) for each row.
    pub fn predict(&self, rows: &[Vec<f64>]) -> ForecastResult<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if self.trees.is_empty() {
            return Err(ForecastError::Inference(format!(
                "{} regressor has no trees",
                self.meal
            )));
        }
        let x = dense(rows, self.feature_names.len()).map_err(ForecastError::Inference)?;
        let mut sums = vec![0.0; rows.len()];
        for tree in &self.trees {
            let outputs = tree.predict(&x).map_err(|err| {
                ForecastError::Inference(format!("{} regressor: {err}", self.meal))
            })?;
            for (sum, output) in sums.iter_mut().zip(outputs) {
                *sum += output;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.trees.len() as f64;
        Ok(sums.into_iter().map(|sum| sum / n).collect())
    }

    /// Attendance for a single row: clamped at zero and floored.
    pub fn predict_count(&self, row: &[f64]) -> ForecastResult<u32> {
        let raw = self.predict(&[row.to_vec()])?;
        raw.first().copied().map(to_count).ok_or_else(|| {
            ForecastError::Inference(format!("{} regressor returned no value", self.meal))
        })
    }

    /// Meal this model forecasts.
    #[must_use]
    pub const fn meal(&self) -> Meal {
        self.meal
    }

    /// Feature order used at fit time.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Hyperparameters used at fit time.
    #[must_use]
    pub const fn params(&self) -> ForestParams {
        self.params
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Number of rows the forest was fitted on.
    #[must_use]
    pub const fn trained_rows(&self) -> usize {
        self.trained_rows
    }
}

/// Converts a raw regression output into a head count.
#[must_use]
pub fn to_count(raw: f64) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else {
        // saturating float-to-int cast
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = raw.floor() as u32;
        count
    }
}

fn dense(rows: &[Vec<f64>], width: usize) -> Result<DenseMatrix<f64>, String> {
    let mut values = Vec::with_capacity(rows.len() * width);
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(format!(
                "row {idx} has {} features, schema expects {width}",
                row.len()
            ));
        }
        values.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(rows.len(), width, values, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_params() -> ForestParams {
        ForestParams {
            n_trees: 20,
            ..ForestParams::DEFAULT
        }
    }

    /// Two features, target grows with the first one.
    fn toy_rows() -> (FeatureSchema, Vec<Vec<f64>>, Vec<f64>) {
        let schema = FeatureSchema::parse("weekday,weekend").unwrap();
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for rep in 0..6 {
            for weekday in 1..=7 {
                let weekend = if weekday >= 6 { 1.0 } else { 0.0 };
                rows.push(vec![f64::from(weekday), weekend]);
                let base = if weekend > 0.0 { 20.0 } else { 200.0 };
                targets.push(base + f64::from(rep));
            }
        }
        (schema, rows, targets)
    }

    #[test]
    fn clamps_and_floors_counts() {
        assert_eq!(to_count(-3.2), 0);
        assert_eq!(to_count(f64::NAN), 0);
        assert_eq!(to_count(12.99), 12);
        assert_eq!(to_count(0.4), 0);
    }

    #[test]
    fn forest_separates_weekdays_from_weekends() {
        let (schema, rows, targets) = toy_rows();
        let model =
            MealRegressor::fit(Meal::Lunch, &schema, &rows, &targets, quick_params()).unwrap();
        let weekday = model.predict_count(&[2.0, 0.0]).unwrap();
        let weekend = model.predict_count(&[7.0, 1.0]).unwrap();
        assert!(weekday > 150, "weekday forecast {weekday}");
        assert!(weekend < 60, "weekend forecast {weekend}");
        assert_eq!(model.trained_rows(), rows.len());
    }

    #[test]
    fn same_seed_gives_same_predictions() {
        let (schema, rows, targets) = toy_rows();
        let first =
            MealRegressor::fit(Meal::Dinner, &schema, &rows, &targets, quick_params()).unwrap();
        let second =
            MealRegressor::fit(Meal::Dinner, &schema, &rows, &targets, quick_params()).unwrap();
        assert_eq!(first.predict(&rows).unwrap(), second.predict(&rows).unwrap());
    }

    /// Root split feature of every tree, read back from the serialized model.
    fn root_split_features(model: &MealRegressor) -> Vec<u64> {
        let value = serde_json::to_value(model).unwrap();
        value["trees"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tree| tree["trees"][0]["nodes"][0]["split_feature"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn trees_sample_features_independently() {
        // eight features, only weekday and weekend carry signal
        let schema = FeatureSchema::canonical();
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for rep in 0..8_u32 {
            for weekday in 1..=7_u32 {
                let weekend = f64::from(u8::from(weekday >= 6));
                let ordinal = f64::from(rep * 7 + weekday);
                rows.push(vec![
                    f64::from(weekday),
                    2.0,
                    2025.0,
                    0.0,
                    weekend,
                    ordinal,
                    1.0,
                    f64::from(rep + 1),
                ]);
                let base = if weekend > 0.0 { 30.0 } else { 250.0 };
                targets.push(base + f64::from(rep));
            }
        }
        let model =
            MealRegressor::fit(Meal::Lunch, &schema, &rows, &targets, ForestParams::DEFAULT)
                .unwrap();
        assert_eq!(model.tree_count(), 200);

        let roots = root_split_features(&model);
        assert_eq!(roots.len(), 200);
        let distinct: std::collections::BTreeSet<_> = roots.iter().copied().collect();
        assert!(distinct.len() > 2, "root splits {distinct:?}");
        assert!(
            distinct.contains(&0) || distinct.contains(&4),
            "no tree splits on weekday or weekend at the root: {distinct:?}"
        );
    }

    #[test]
    fn tree_seeds_are_distinct_and_reproducible() {
        let seeds = ForestParams::DEFAULT.tree_seeds();
        assert_eq!(seeds, ForestParams::DEFAULT.tree_seeds());
        let distinct: std::collections::BTreeSet<_> = seeds.iter().collect();
        assert_eq!(distinct.len(), seeds.len());
    }

    #[test]
    fn width_mismatch_is_an_inference_error() {
        let (schema, rows, targets) = toy_rows();
        let model =
            MealRegressor::fit(Meal::Breakfast, &schema, &rows, &targets, quick_params()).unwrap();
        let err = model.predict_count(&[1.0, 0.0, 5.0]).unwrap_err();
        assert!(matches!(err, ForecastError::Inference(_)));
    }

    #[test]
    fn serialized_model_predicts_identically() {
        let (schema, rows, targets) = toy_rows();
        let model =
            MealRegressor::fit(Meal::Lunch, &schema, &rows, &targets, quick_params()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: MealRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.feature_names(), model.feature_names());
        assert_eq!(restored.predict(&rows).unwrap(), model.predict(&rows).unwrap());
    }
}
