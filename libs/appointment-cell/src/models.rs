use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical states pending/confirmed/cancelled/completed; wire values are
/// the Spanish strings the mobile app persisted into `citas`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "confirmada")]
    Confirmed,
    #[serde(rename = "cancelada")]
    Cancelled,
    #[serde(rename = "completada")]
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pendiente",
            AppointmentStatus::Confirmed => "confirmada",
            AppointmentStatus::Cancelled => "cancelada",
            AppointmentStatus::Completed => "completada",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(rename = "veterinarioId")]
    pub veterinario_id: Uuid,
    pub fecha: NaiveDate,
    pub hora: String,
    pub motivo: String,
    #[serde(rename = "petId")]
    pub pet_id: Uuid,
    pub estado: AppointmentStatus,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "fechaCreacion")]
    pub fecha_creacion: DateTime<Utc>,
    #[serde(rename = "motivoCancelacion", default)]
    pub motivo_cancelacion: Option<String>,
    #[serde(rename = "recetaBase64", default)]
    pub receta_base64: Option<String>,
}

/// Booking input. Every field is optional on the wire so a rejection can
/// name all the missing ones at once; empty strings count as missing, the
/// way the original form validation treated them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(rename = "veterinarioId")]
    pub veterinario_id: Option<Uuid>,
    pub fecha: Option<NaiveDate>,
    pub hora: Option<String>,
    pub motivo: Option<String>,
    #[serde(rename = "petId")]
    pub pet_id: Option<Uuid>,
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

/// A fully validated booking request.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub veterinario_id: Uuid,
    pub fecha: NaiveDate,
    pub hora: String,
    pub motivo: String,
    pub pet_id: Uuid,
    pub user_id: Uuid,
    pub tz_offset_minutes: i32,
}

impl CreateAppointmentRequest {
    pub fn validate(self) -> Result<NewAppointment, AppointmentError> {
        let mut missing = Vec::new();

        if self.veterinario_id.is_none() {
            missing.push("veterinarioId");
        }
        if self.fecha.is_none() {
            missing.push("fecha");
        }
        if self.hora.as_deref().map_or(true, |h| h.trim().is_empty()) {
            missing.push("hora");
        }
        if self.motivo.as_deref().map_or(true, |m| m.trim().is_empty()) {
            missing.push("motivo");
        }
        if self.pet_id.is_none() {
            missing.push("petId");
        }
        if self.user_id.is_none() {
            missing.push("userId");
        }

        if !missing.is_empty() {
            return Err(AppointmentError::MissingFields(missing.join(", ")));
        }

        Ok(NewAppointment {
            veterinario_id: self.veterinario_id.unwrap(),
            fecha: self.fecha.unwrap(),
            hora: self.hora.unwrap(),
            motivo: self.motivo.unwrap(),
            pet_id: self.pet_id.unwrap(),
            user_id: self.user_id.unwrap(),
            tz_offset_minutes: self.tz_offset_minutes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub motivo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub estado: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachPrescriptionRequest {
    #[serde(rename = "recetaBase64")]
    pub receta_base64: String,
}

/// Listing row: the appointment plus best-effort display data joined from
/// `users`, `mascotas` and `veterinarios`. Each extra is independently
/// optional; a failed lookup nulls that field and nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedAppointment {
    #[serde(flatten)]
    pub cita: Appointment,
    #[serde(rename = "ownerName")]
    pub owner_name: Option<String>,
    #[serde(rename = "ownerEmail")]
    pub owner_email: Option<String>,
    #[serde(rename = "petName")]
    pub pet_name: Option<String>,
    #[serde(rename = "petSpecies")]
    pub pet_species: Option<String>,
    #[serde(rename = "vetName")]
    pub vet_name: Option<String>,
    #[serde(rename = "vetEspecialidad")]
    pub vet_especialidad: Option<String>,
}

impl EnrichedAppointment {
    pub fn bare(cita: Appointment) -> Self {
        Self {
            cita,
            owner_name: None,
            owner_email: None,
            pet_name: None,
            pet_species: None,
            vet_name: None,
            vet_especialidad: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Pet not found")]
    PetNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment slot no longer available")]
    SlotNotAvailable,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Not authorized to act on this appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Reminder sync failed: {0}")]
    ReminderSync(String),
}
