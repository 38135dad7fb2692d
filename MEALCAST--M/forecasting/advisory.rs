use serde::{Deserialize, Serialize};

use crate::inference::PredictionResult;

/// Totals above this value call for extra staff.
pub const HIGH_LOAD_THRESHOLD: u32 = 700;
/// Totals below this value call for reduced stock.
pub const LOW_LOAD_THRESHOLD: u32 = 300;

/// Expected crowd level for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    /// Above [`HIGH_LOAD_THRESHOLD`].
    High,
    /// Between the thresholds.
    Normal,
    /// Below [`LOW_LOAD_THRESHOLD`].
    Low,
}

/// Kitchen planning hints derived from a forecast total. Display helper only;
/// the forecast itself is never altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffingAdvisory {
    /// Meals to prepare (10% margin).
    pub meals_to_prepare: u32,
    /// Minimum stock (90% of the forecast).
    pub minimum_stock: u32,
    /// Optimal stock (5% margin).
    pub optimal_stock: u32,
    /// Crowd level.
    pub load: LoadLevel,
}

impl StaffingAdvisory {
    /// Derives the advisory for a forecast.
    #[must_use]
    pub fn for_prediction(prediction: &PredictionResult) -> Self {
        let total = prediction.total;
        let load = if total > HIGH_LOAD_THRESHOLD {
            LoadLevel::High
        } else if total < LOW_LOAD_THRESHOLD {
            LoadLevel::Low
        } else {
            LoadLevel::Normal
        };
        Self {
            meals_to_prepare: scaled(total, 110),
            minimum_stock: scaled(total, 90),
            optimal_stock: scaled(total, 105),
            load,
        }
    }
}

/// `ceil(total * percent / 100)` in integer arithmetic.
fn scaled(total: u32, percent: u64) -> u32 {
    let value = (u64::from(total) * percent).div_ceil(100);
    u32::try_from(value).unwrap_or(u32::MAX)
}
