use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use mealcast_forecasting::InferenceService;

use crate::handler::{health, predict};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
}

pub fn create_router(app_state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/predict", post(predict))
        // old path name; the response uses the English keys
        .route("/predire", post(predict));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .with_state(app_state)
}
