use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ForecastError, ForecastResult},
    features::{FeatureVector, FEATURE_NAMES},
};

/// Meal service forecast by a dedicated regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Meal {
    /// Morning service.
    Breakfast,
    /// Midday service.
    Lunch,
    /// Evening service.
    Dinner,
}

impl Meal {
    /// Every meal, in reporting order.
    pub const ALL: [Self; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    /// Canonical column / artifact name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }

    /// File name of the persisted model for this meal.
    #[must_use]
    pub fn model_file_name(self) -> String {
        format!("model_{}.json", self.as_str())
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Meal {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|meal| meal.as_str() == raw)
            .ok_or_else(|| format!("unknown meal `{raw}`"))
    }
}

/// Ordered feature names shared by the trainer and the inference service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl FeatureSchema {
    /// Schema in the order the feature deriver produces.
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Parses the comma-joined text form.
    pub fn parse(raw: &str) -> ForecastResult<Self> {
        let names: Vec<String> = raw
            .trim()
            .split(',')
            .map(|name| name.trim().to_string())
            .collect();
        if names.iter().any(String::is_empty) {
            return Err(ForecastError::Inference(format!(
                "feature schema `{}` contains an empty name",
                raw.trim()
            )));
        }
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !FEATURE_NAMES.contains(name))
            .collect();
        if !unknown.is_empty() {
            return Err(ForecastError::Inference(format!(
                "feature schema names unknown features: {}",
                unknown.join(", ")
            )));
        }
        Ok(Self { names })
    }

    /// Reads the schema file written at training time.
    pub fn load(path: &Path) -> ForecastResult<Self> {
        if !path.exists() {
            return Err(ForecastError::ArtifactMissing {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|err| ForecastError::corrupt(path, err))?;
        Self::parse(&raw).map_err(|err| ForecastError::corrupt(path, err))
    }

    /// Comma-joined text form.
    #[must_use]
    pub fn to_line(&self) -> String {
        self.names.join(",")
    }

    /// Feature names in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the schema names no feature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Builds a regressor input row by looking each schema name up in the vector.
    pub fn project(&self, features: &FeatureVector) -> ForecastResult<Vec<f64>> {
        self.names
            .iter()
            .map(|name| {
                features.get(name).ok_or_else(|| {
                    ForecastError::Inference(format!("feature `{name}` cannot be derived"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{derive, CalendarInput};

    fn sample() -> FeatureVector {
        derive(&CalendarInput {
            weekday: 3,
            day: 5,
            month: 3,
            year: 2025,
            weekend: false,
            holiday: true,
        })
        .unwrap()
    }

    #[test]
    fn text_form_round_trips() {
        let schema = FeatureSchema::canonical();
        assert_eq!(
            schema.to_line(),
            "weekday,month,year,holiday,weekend,day_of_year,quarter,week_of_year"
        );
        assert_eq!(FeatureSchema::parse(&schema.to_line()).unwrap(), schema);
    }

    #[test]
    fn projection_follows_persisted_order() {
        let schema = FeatureSchema::parse("month,weekday,holiday").unwrap();
        assert_eq!(schema.project(&sample()).unwrap(), vec![3.0, 3.0, 1.0]);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = FeatureSchema::parse("weekday,temperature").unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn meal_names_parse_back() {
        for meal in Meal::ALL {
            assert_eq!(meal.as_str().parse::<Meal>().unwrap(), meal);
        }
        assert_eq!(Meal::Lunch.model_file_name(), "model_lunch.json");
    }
}
