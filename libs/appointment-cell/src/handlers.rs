use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use futures::stream::Stream;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{
    AppointmentError, AttachPrescriptionRequest, CancelAppointmentRequest,
    CreateAppointmentRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PetNotFound => AppError::NotFound("Pet not found".to_string()),
        AppointmentError::ProviderNotFound => AppError::NotFound("Provider not found".to_string()),
        AppointmentError::MissingFields(fields) => {
            AppError::Validation(format!("Missing required fields: {}", fields))
        }
        AppointmentError::ValidationError(msg) => AppError::Validation(msg),
        AppointmentError::SlotNotAvailable => {
            AppError::Conflict("Appointment slot no longer available".to_string())
        }
        AppointmentError::InvalidStatusTransition(status) => AppError::Conflict(format!(
            "Appointment cannot be modified in current status: {}",
            status
        )),
        AppointmentError::Unauthorized => {
            AppError::Permission("Not authorized to act on this appointment".to_string())
        }
        AppointmentError::DatabaseError(msg) => AppError::Upstream(msg),
        AppointmentError::ReminderSync(msg) => AppError::Upstream(msg),
    }
}

pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .create_appointment(request, &user, Utc::now(), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .list_appointments(&user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

/// Live listing: one SSE event per upstream change, each carrying the full
/// replacement snapshot.
pub async fn watch_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let service = AppointmentBookingService::new(&state);
    let rx = service.watch_appointments(&user, auth.token());

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        match rx.changed().await {
            Ok(()) => {
                let rows = rx.borrow_and_update().clone();
                let event = Event::default().json_data(&rows).unwrap_or_default();
                Some((Ok(event), rx))
            }
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    if !user.is_admin() && appointment.user_id.to_string() != user.id {
        return Err(AppError::Permission(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "appointment": appointment })))
}

/// Operator action: regular users may not cancel, by design; reschedule is
/// modelled as cancel + create.
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let motivo = request.motivo.unwrap_or_default();

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .cancel_appointment(appointment_id, &motivo, Utc::now(), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

pub async fn update_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .update_status(appointment_id, request.estado, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

pub async fn attach_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<AttachPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .attach_prescription(appointment_id, &request.receta_base64, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}
