use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A calendar entry in the `recordatorios` collection. Either derived from
/// an appointment (`cita_id` set, status mirrored) or created directly by
/// the user. Dates and time labels are stored normalized to UTC; the epoch
/// timestamp drives ordering and the in-the-past check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub fecha: NaiveDate,
    pub hora: String,
    pub descripcion: String,
    pub timestamp: i64,
    #[serde(rename = "notificationId")]
    pub notification_id: i64,
    #[serde(rename = "citaId", default)]
    pub cita_id: Option<Uuid>,
    #[serde(rename = "estadoCita", default)]
    pub estado_cita: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// What the synchronizer needs to know about an appointment. Passed in by
/// the appointment cell; this crate never reads `citas` itself.
#[derive(Debug, Clone)]
pub struct AppointmentRef {
    pub cita_id: Uuid,
    pub user_id: Uuid,
    /// Local calendar date and slot label as booked.
    pub fecha: NaiveDate,
    pub hora: String,
    pub motivo: String,
    pub estado: String,
    pub pet_name: String,
    pub vet_name: String,
    /// Caller's UTC offset in minutes east, for normalization.
    pub tz_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReminderRequest {
    pub fecha: NaiveDate,
    pub hora: String,
    pub descripcion: String,
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReminderRequest {
    pub fecha: Option<NaiveDate>,
    pub hora: Option<String>,
    pub descripcion: Option<String>,
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReminderError {
    #[error("Reminder not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
