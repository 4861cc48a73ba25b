use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreError;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{CreateProviderRequest, ProviderError, UpdateProviderRequest};
use crate::services::availability::AvailabilityService;
use crate::services::provider::ProviderAdminService;

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub fecha: NaiveDate,
    /// Caller's UTC offset in minutes east; drives the today-cutoff.
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct DisponibleRequest {
    pub disponible: bool,
}

/// Admin CRUD errors arrive as `anyhow::Error`; a store or decode failure
/// buried in the chain is an upstream problem, anything else is bad input.
fn map_admin_error(e: anyhow::Error) -> AppError {
    if e.downcast_ref::<StoreError>().is_some() || e.downcast_ref::<serde_json::Error>().is_some() {
        AppError::Upstream(e.to_string())
    } else {
        AppError::Validation(e.to_string())
    }
}

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotFound => AppError::NotFound("Provider not found".to_string()),
        ProviderError::DatabaseError(msg) => AppError::Upstream(msg),
    }
}

pub async fn list_providers(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderAdminService::new(&state);
    let providers = service
        .list_providers(auth.token())
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(json!({ "providers": providers })))
}

pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slots = service
        .available_slots(
            provider_id,
            query.fecha,
            query.tz_offset_minutes,
            Utc::now(),
            auth.token(),
        )
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "providerId": provider_id,
        "fecha": query.fecha,
        "slots": slots,
    })))
}

pub async fn create_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateProviderRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ProviderAdminService::new(&state);
    let provider = service
        .create_provider(request, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "provider": provider })))
}

pub async fn update_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<UpdateProviderRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ProviderAdminService::new(&state);
    let provider = service
        .update_provider(provider_id, request, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "provider": provider })))
}

pub async fn delete_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ProviderAdminService::new(&state);
    service
        .delete_provider(provider_id, auth.token())
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

pub async fn set_disponible(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<DisponibleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ProviderAdminService::new(&state);
    let provider = service
        .set_disponible(provider_id, request.disponible, auth.token())
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(json!({ "provider": provider })))
}

pub async fn list_especialidades(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderAdminService::new(&state);
    let especialidades = service
        .list_especialidades(auth.token())
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(json!({ "especialidades": especialidades })))
}
