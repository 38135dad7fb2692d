use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use mealcast_forecasting::{ForecastError, PredictionRequest};
use serde_json::{json, Value};

use crate::app::AppState;

type ApiError = (StatusCode, Json<Value>);

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": rejection.body_text() })),
        )
    })?;

    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.predict(&request))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    match outcome {
        Ok(prediction) => Ok((StatusCode::OK, Json(json!(prediction)))),
        Err(err) => Err(error_response(&err)),
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!(state.service.status())))
}

fn error_response(err: &ForecastError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() })))
}
