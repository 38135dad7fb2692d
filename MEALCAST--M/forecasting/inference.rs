use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    artifacts::ArtifactStore,
    errors::{ForecastError, ForecastResult},
    features::{derive, CalendarInput},
    regression::forest::MealRegressor,
    schema::{FeatureSchema, Meal},
    telemetry::{self, ForecastTelemetry},
};

/// Prediction request as received from the web layer. Every field is kept
/// loosely typed so that missing or mistyped values can be reported by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// ISO weekday, 1..=7.
    #[serde(default, alias = "jour_semaine")]
    pub weekday: Option<Value>,
    /// Day of month.
    #[serde(default, alias = "jour")]
    pub day: Option<Value>,
    /// Month, 1..=12.
    #[serde(default, alias = "mois")]
    pub month: Option<Value>,
    /// Calendar year.
    #[serde(default, alias = "annee")]
    pub year: Option<Value>,
    /// Weekend flag, 0/1 or boolean.
    #[serde(default)]
    pub weekend: Option<Value>,
    /// Holiday flag, 0/1 or boolean.
    #[serde(default, alias = "jour_ferie")]
    pub holiday: Option<Value>,
}

impl From<CalendarInput> for PredictionRequest {
    fn from(input: CalendarInput) -> Self {
        Self {
            weekday: Some(json!(input.weekday)),
            day: Some(json!(input.day)),
            month: Some(json!(input.month)),
            year: Some(json!(input.year)),
            weekend: Some(json!(u8::from(input.weekend))),
            holiday: Some(json!(u8::from(input.holiday))),
        }
    }
}

impl PredictionRequest {
    /// Checks presence and types of the six fields, then calendar ranges.
    pub fn validate(&self) -> ForecastResult<CalendarInput> {
        let weekday = required("weekday", self.weekday.as_ref())?;
        let day = required("day", self.day.as_ref())?;
        let month = required("month", self.month.as_ref())?;
        let year = required("year", self.year.as_ref())?;
        let weekend = required("weekend", self.weekend.as_ref())?;
        let holiday = required("holiday", self.holiday.as_ref())?;

        let input = CalendarInput {
            weekday: unsigned("weekday", weekday)?,
            day: unsigned("day", day)?,
            month: unsigned("month", month)?,
            year: i32::try_from(integer("year", year)?)
                .map_err(|_| ForecastError::invalid("year", "out of range"))?,
            weekend: flag("weekend", weekend)?,
            holiday: flag("holiday", holiday)?,
        };
        input.date()?;
        Ok(input)
    }
}

fn required<'v>(field: &'static str, value: Option<&'v Value>) -> ForecastResult<&'v Value> {
    match value {
        None | Some(Value::Null) => Err(ForecastError::invalid(field, "missing required field")),
        Some(value) => Ok(value),
    }
}

fn integer(field: &'static str, value: &Value) -> ForecastResult<i64> {
    if let Some(int) = value.as_i64() {
        return Ok(int);
    }
    match value.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(float) if float.is_finite() && float.fract() == 0.0 => Ok(float as i64),
        _ => Err(ForecastError::invalid(
            field,
            format!("expected an integer, got {value}"),
        )),
    }
}

fn unsigned(field: &'static str, value: &Value) -> ForecastResult<u32> {
    let int = integer(field, value)?;
    u32::try_from(int).map_err(|_| ForecastError::invalid(field, format!("{int} is out of range")))
}

fn flag(field: &'static str, value: &Value) -> ForecastResult<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        other => match integer(field, other)? {
            0 => Ok(false),
            1 => Ok(true),
            int => Err(ForecastError::invalid(
                field,
                format!("flag must be 0 or 1, got {int}"),
            )),
        },
    }
}

/// Forecast for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Breakfast attendance.
    pub breakfast: u32,
    /// Lunch attendance.
    pub lunch: u32,
    /// Dinner attendance.
    pub dinner: u32,
    /// Sum of the three meals.
    pub total: u32,
}

impl PredictionResult {
    /// Builds a result whose total is the sum of the meals.
    #[must_use]
    pub const fn new(breakfast: u32, lunch: u32, dinner: u32) -> Self {
        Self {
            breakfast,
            lunch,
            dinner,
            total: breakfast.saturating_add(lunch).saturating_add(dinner),
        }
    }

    /// Forecast for one meal.
    #[must_use]
    pub const fn get(&self, meal: Meal) -> u32 {
        match meal {
            Meal::Breakfast => self.breakfast,
            Meal::Lunch => self.lunch,
            Meal::Dinner => self.dinner,
        }
    }
}

/// Readiness snapshot exposed by health checks.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Always `ready`: a service only exists once its artifacts are loaded.
    pub status: &'static str,
    /// Artifact directory the models came from.
    pub artifacts: String,
    /// Loaded feature order.
    pub features: Vec<String>,
    /// Loaded meals.
    pub meals: Vec<Meal>,
    /// Load time.
    pub loaded_at: DateTime<Utc>,
}

/// Read-only prediction service owning the three regressors and the schema.
/// Constructed once at startup and shared behind an `Arc`.
#[derive(Debug)]
pub struct InferenceService {
    schema: FeatureSchema,
    models: Vec<MealRegressor>,
    artifacts: String,
    loaded_at: DateTime<Utc>,
    telemetry: Option<ForecastTelemetry>,
}

impl InferenceService {
    /// Loads the schema and every meal model. Any missing or inconsistent
    /// artifact is fatal.
    pub fn load(store: &ArtifactStore) -> ForecastResult<Self> {
        let schema = store.load_schema()?;
        let models = Meal::ALL
            .into_iter()
            .map(|meal| store.load_model(meal, &schema))
            .collect::<ForecastResult<Vec<_>>>()?;
        Ok(Self {
            schema,
            models,
            artifacts: store.dir().display().to_string(),
            loaded_at: Utc::now(),
            telemetry: None,
        })
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        telemetry::log(
            Some(&telemetry),
            LogLevel::Info,
            "models_loaded",
            json!({ "artifacts": self.artifacts, "features": self.schema.names() }),
        );
        self.telemetry = Some(telemetry);
        self
    }

    /// Validates a raw request and forecasts it.
    pub fn predict(&self, request: &PredictionRequest) -> ForecastResult<PredictionResult> {
        let outcome = request
            .validate()
            .and_then(|input| self.predict_input(&input));
        if let Err(err) = &outcome {
            let level = if matches!(err, ForecastError::InvalidInput { .. }) {
                LogLevel::Info
            } else {
                LogLevel::Warn
            };
            telemetry::log(
                self.telemetry.as_ref(),
                level,
                "prediction_rejected",
                json!({ "error": err.to_string() }),
            );
            telemetry::event(
                self.telemetry.as_ref(),
                "forecast.inference.rejected",
                json!({ "client_error": err.is_client_error(), "error": err.to_string() }),
            );
        }
        outcome
    }

    /// Forecasts an already typed calendar input.
    pub fn predict_input(&self, input: &CalendarInput) -> ForecastResult<PredictionResult> {
        let features = derive(input)?;
        let row = self.schema.project(&features)?;
        let mut counts = [0_u32; 3];
        for (slot, model) in counts.iter_mut().zip(&self.models) {
            if row.len() != model.feature_names().len() {
                return Err(ForecastError::Inference(format!(
                    "{} model expects {} features, got {}",
                    model.meal(),
                    model.feature_names().len(),
                    row.len()
                )));
            }
            *slot = model.predict_count(&row)?;
        }
        let result = PredictionResult::new(counts[0], counts[1], counts[2]);
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "prediction_served",
            json!({ "input": input, "result": result }),
        );
        Ok(result)
    }

    /// Health snapshot.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            status: "ready",
            artifacts: self.artifacts.clone(),
            features: self.schema.names().to_vec(),
            meals: self.models.iter().map(MealRegressor::meal).collect(),
            loaded_at: self.loaded_at,
        }
    }
}
