use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_providers))
        .route("/", post(handlers::create_provider))
        .route("/especialidades", get(handlers::list_especialidades))
        .route("/{provider_id}", put(handlers::update_provider))
        .route("/{provider_id}", delete(handlers::delete_provider))
        .route("/{provider_id}/disponible", patch(handlers::set_disponible))
        .route("/{provider_id}/slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
