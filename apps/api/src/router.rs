use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use provider_cell::router::provider_routes;
use reminder_cell::router::reminder_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Petcare scheduling API is running!" }))
        .nest("/veterinarios", provider_routes(state.clone()))
        .nest("/citas", appointment_routes(state.clone()))
        .nest("/recordatorios", reminder_routes(state.clone()))
}
