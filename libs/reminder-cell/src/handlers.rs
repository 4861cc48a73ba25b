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
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateReminderRequest, ReminderError, UpdateReminderRequest};
use crate::services::calendar::ReminderCalendarService;
use crate::services::sync::to_utc_parts;

#[derive(Debug, Deserialize)]
pub struct ReminderListQuery {
    /// Local calendar date to filter on; converted to its UTC date before
    /// the equality match, mirroring how reminders are stored.
    pub fecha: Option<NaiveDate>,
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

fn map_reminder_error(e: ReminderError) -> AppError {
    match e {
        ReminderError::NotFound => AppError::NotFound("Reminder not found".to_string()),
        ReminderError::Validation(msg) => AppError::Validation(msg),
        ReminderError::DatabaseError(msg) => AppError::Upstream(msg),
    }
}

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))
}

pub async fn list_reminders(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ReminderListQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let fecha_utc = query
        .fecha
        .map(|fecha| to_utc_parts(fecha, "00:00", query.tz_offset_minutes).0);

    let service = ReminderCalendarService::new(&state);
    let reminders = service
        .list_reminders(user_id, fecha_utc, auth.token())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({ "reminders": reminders })))
}

pub async fn create_reminder(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateReminderRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let service = ReminderCalendarService::new(&state);
    let reminder = service
        .create_reminder(request, user_id, Utc::now(), auth.token())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({ "reminder": reminder })))
}

pub async fn update_reminder(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(reminder_id): Path<Uuid>,
    Json(request): Json<UpdateReminderRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let service = ReminderCalendarService::new(&state);
    let reminder = service
        .update_reminder(reminder_id, request, user_id, Utc::now(), auth.token())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({ "reminder": reminder })))
}

pub async fn delete_reminder(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(reminder_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;

    let service = ReminderCalendarService::new(&state);
    service
        .delete_reminder(reminder_id, user_id, auth.token())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({ "success": true })))
}
