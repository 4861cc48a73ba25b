use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use provider_cell::models::ProviderError;
use provider_cell::services::availability::AvailabilityService;
use reminder_cell::models::AppointmentRef;
use reminder_cell::services::notify::{HttpNotificationGateway, NotificationGateway};
use reminder_cell::services::sync::ReminderSyncService;
use shared_config::AppConfig;
use shared_database::{live, StoreError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest,
    EnrichedAppointment, NewAppointment,
};
use crate::services::lifecycle::AppointmentLifecycleService;

const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    availability: AvailabilityService,
    lifecycle: AppointmentLifecycleService,
    reminders: ReminderSyncService,
    gateway: Arc<dyn NotificationGateway>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let gateway: Arc<dyn NotificationGateway> = Arc::new(HttpNotificationGateway::new(config));
        Self::with_parts(supabase, gateway)
    }

    pub fn with_parts(
        supabase: Arc<SupabaseClient>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            availability: AvailabilityService::with_client(Arc::clone(&supabase)),
            lifecycle: AppointmentLifecycleService::new(),
            reminders: ReminderSyncService::with_parts(Arc::clone(&supabase), Arc::clone(&gateway)),
            supabase,
            gateway,
        }
    }

    /// Book an appointment. Availability is rechecked immediately before
    /// the write; the store's uniqueness guard on (veterinarioId, fecha,
    /// hora) over non-cancelled rows is what actually decides a race — a
    /// concurrent create for the same slot gets a 409 back and fails here
    /// with the same conflict error. Creating the linked reminder and
    /// scheduling its notification is part of this contract, not optional.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        user: &User,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let new = request.validate()?;

        if !user.is_admin() && new.user_id.to_string() != user.id {
            return Err(AppointmentError::Unauthorized);
        }

        let (pet_name, _) = self.get_pet(new.pet_id, new.user_id, auth_token).await?;

        let provider = self
            .availability
            .get_provider(new.veterinario_id, auth_token)
            .await
            .map_err(map_provider_error)?;

        let slots = self
            .availability
            .available_slots_for(&provider, new.fecha, new.tz_offset_minutes, now_utc, auth_token)
            .await
            .map_err(map_provider_error)?;

        if !slots.contains(&new.hora) {
            info!(
                "slot {} on {} no longer available for provider {}",
                new.hora, new.fecha, new.veterinario_id
            );
            return Err(AppointmentError::SlotNotAvailable);
        }

        let appointment = self.insert_appointment(&new, now_utc, auth_token).await?;

        let source = AppointmentRef {
            cita_id: appointment.id,
            user_id: appointment.user_id,
            fecha: appointment.fecha,
            hora: appointment.hora.clone(),
            motivo: appointment.motivo.clone(),
            estado: appointment.estado.to_string(),
            pet_name,
            vet_name: provider.nombre.clone(),
            tz_offset_minutes: new.tz_offset_minutes,
        };
        // No rollback of the appointment on failure here; the caller gets
        // a transient error and may re-invoke (the derivation is
        // idempotent in the notification id).
        self.reminders
            .create_for_appointment(&source, now_utc, auth_token)
            .await
            .map_err(|e| AppointmentError::ReminderSync(e.to_string()))?;

        info!(
            "appointment {} booked with provider {} at {} {}",
            appointment.id, appointment.veterinario_id, appointment.fecha, appointment.hora
        );
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/citas?id=eq.{}", appointment_id);
        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Cancel an appointment on behalf of an operator. The caller's role
    /// is checked at the handler; this enforces the reason, the terminal
    /// states, and the side effects: reminder annotation + notification
    /// cancellation, and the push notice to the owning user.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        motivo: &str,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if motivo.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "A cancellation reason is required".to_string(),
            ));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(current.estado, AppointmentStatus::Cancelled)?;

        let row = self
            .supabase
            .update_returning(
                "citas",
                &appointment_id.to_string(),
                json!({
                    "estado": AppointmentStatus::Cancelled,
                    "motivoCancelacion": motivo,
                }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let cancelled: Appointment =
            serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        self.reminders
            .on_appointment_cancelled(appointment_id, motivo, now_utc, auth_token)
            .await
            .map_err(|e| AppointmentError::ReminderSync(e.to_string()))?;

        // The push dispatcher is fire-and-forget; a failed notice never
        // undoes a completed cancellation.
        let body = format!(
            "Tu cita del {} a las {} fue cancelada. Motivo: {}",
            cancelled.fecha, cancelled.hora, motivo
        );
        if let Err(e) = self
            .gateway
            .send_to_user(cancelled.user_id, "Cita cancelada", &body)
            .await
        {
            warn!("failed to push cancellation notice to {}: {}", cancelled.user_id, e);
        }

        info!("appointment {} cancelled: {}", appointment_id, motivo);
        Ok(cancelled)
    }

    /// Operator confirm/complete. Cancellation has its own operation since
    /// it requires a reason and triggers side effects.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if new_status == AppointmentStatus::Cancelled {
            return Err(AppointmentError::ValidationError(
                "Use the cancel operation to cancel an appointment".to_string(),
            ));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(current.estado, new_status)?;

        let row = self
            .supabase
            .update_returning(
                "citas",
                &appointment_id.to_string(),
                json!({ "estado": new_status }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Attach a prescription document to an appointment (opaque base64
    /// payload, stored as-is).
    pub async fn attach_prescription(
        &self,
        appointment_id: Uuid,
        receta_base64: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if BASE64.decode(receta_base64).is_err() {
            return Err(AppointmentError::ValidationError(
                "recetaBase64 is not valid base64".to_string(),
            ));
        }

        // The attachment only makes sense on an existing, non-cancelled
        // appointment.
        let current = self.get_appointment(appointment_id, auth_token).await?;
        if current.estado == AppointmentStatus::Cancelled {
            return Err(AppointmentError::InvalidStatusTransition(current.estado));
        }

        let row = self
            .supabase
            .update_returning(
                "citas",
                &appointment_id.to_string(),
                json!({ "recetaBase64": receta_base64 }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Role-scoped listing. Admins see everything with best-effort display
    /// enrichment; users see only their own rows. Active appointments come
    /// first ordered by (fecha, hora); cancelled ones trail in whatever
    /// order they arrive.
    pub async fn list_appointments(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<EnrichedAppointment>, AppointmentError> {
        let path = if user.is_admin() {
            "/rest/v1/citas?order=fecha.asc,hora.asc".to_string()
        } else {
            format!("/rest/v1/citas?userId=eq.{}&order=fecha.asc,hora.asc", user.id)
        };

        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // Stable partition: the store already ordered by (fecha, hora).
        let (active, cancelled): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|a| a.estado != AppointmentStatus::Cancelled);

        let ordered = active.into_iter().chain(cancelled);

        if !user.is_admin() {
            return Ok(ordered.map(EnrichedAppointment::bare).collect());
        }

        let mut enricher = Enricher::new(&self.supabase, auth_token);
        let mut enriched = Vec::new();
        for cita in ordered {
            enriched.push(enricher.enrich(cita).await);
        }
        Ok(enriched)
    }

    /// Subscribe-and-replace live listing: full snapshots of the caller's
    /// appointment rows, re-polled upstream and published on change.
    pub fn watch_appointments(&self, user: &User, auth_token: &str) -> watch::Receiver<Vec<Value>> {
        let path = if user.is_admin() {
            "/rest/v1/citas?order=fecha.asc,hora.asc".to_string()
        } else {
            format!("/rest/v1/citas?userId=eq.{}&order=fecha.asc,hora.asc", user.id)
        };

        live::subscribe(
            Arc::clone(&self.supabase),
            path,
            auth_token.to_string(),
            LIVE_POLL_INTERVAL,
        )
    }

    async fn get_pet(
        &self,
        pet_id: Uuid,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<(String, String), AppointmentError> {
        let path = format!("/rest/v1/mascotas?id=eq.{}&userId=eq.{}", pet_id, owner_id);
        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::PetNotFound)?;
        let name = row["name"].as_str().unwrap_or("Mascota").to_string();
        let species = row["species"].as_str().unwrap_or("").to_string();
        Ok((name, species))
    }

    async fn insert_appointment(
        &self,
        new: &NewAppointment,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let data = json!({
            "veterinarioId": new.veterinario_id,
            "fecha": new.fecha,
            "hora": new.hora,
            "motivo": new.motivo,
            "petId": new.pet_id,
            "estado": AppointmentStatus::Pending,
            "userId": new.user_id,
            "fechaCreacion": now_utc.to_rfc3339(),
        });

        let row = self
            .supabase
            .insert_returning("citas", data, auth_token)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    debug!(
                        "uniqueness guard rejected ({}, {}, {})",
                        new.veterinario_id, new.fecha, new.hora
                    );
                    AppointmentError::SlotNotAvailable
                }
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}

fn map_provider_error(e: ProviderError) -> AppointmentError {
    match e {
        ProviderError::NotFound => AppointmentError::ProviderNotFound,
        ProviderError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}

/// Per-request memo for the admin listing joins. Every lookup is
/// best-effort: an upstream failure or a missing row leaves the fields
/// `None` for that row and is never propagated.
struct Enricher<'a> {
    supabase: &'a SupabaseClient,
    auth_token: &'a str,
    users: HashMap<Uuid, Option<(String, String)>>,
    pets: HashMap<Uuid, Option<(String, String)>>,
    vets: HashMap<Uuid, Option<(String, String)>>,
}

impl<'a> Enricher<'a> {
    fn new(supabase: &'a SupabaseClient, auth_token: &'a str) -> Self {
        Self {
            supabase,
            auth_token,
            users: HashMap::new(),
            pets: HashMap::new(),
            vets: HashMap::new(),
        }
    }

    async fn enrich(&mut self, cita: Appointment) -> EnrichedAppointment {
        let owner = self.lookup(Collection::Users, cita.user_id).await;
        let pet = self.lookup(Collection::Mascotas, cita.pet_id).await;
        let vet = self.lookup(Collection::Veterinarios, cita.veterinario_id).await;

        EnrichedAppointment {
            owner_name: owner.as_ref().map(|(a, _)| a.clone()),
            owner_email: owner.as_ref().map(|(_, b)| b.clone()),
            pet_name: pet.as_ref().map(|(a, _)| a.clone()),
            pet_species: pet.as_ref().map(|(_, b)| b.clone()),
            vet_name: vet.as_ref().map(|(a, _)| a.clone()),
            vet_especialidad: vet.as_ref().map(|(_, b)| b.clone()),
            cita,
        }
    }

    async fn lookup(&mut self, collection: Collection, id: Uuid) -> Option<(String, String)> {
        let cache = match collection {
            Collection::Users => &mut self.users,
            Collection::Mascotas => &mut self.pets,
            Collection::Veterinarios => &mut self.vets,
        };
        if let Some(hit) = cache.get(&id) {
            return hit.clone();
        }

        let path = format!("/rest/v1/{}?id=eq.{}", collection.name(), id);
        let result = match self.supabase.select(&path, self.auth_token).await {
            Ok(rows) => rows.into_iter().next().map(|row| collection.fields(&row)),
            Err(e) => {
                warn!("enrichment lookup {}/{} failed: {}", collection.name(), id, e);
                None
            }
        };

        match collection {
            Collection::Users => self.users.insert(id, result.clone()),
            Collection::Mascotas => self.pets.insert(id, result.clone()),
            Collection::Veterinarios => self.vets.insert(id, result.clone()),
        };
        result
    }
}

#[derive(Clone, Copy)]
enum Collection {
    Users,
    Mascotas,
    Veterinarios,
}

impl Collection {
    fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Mascotas => "mascotas",
            Collection::Veterinarios => "veterinarios",
        }
    }

    fn fields(&self, row: &Value) -> (String, String) {
        let take = |key: &str| row[key].as_str().unwrap_or_default().to_string();
        match self {
            Collection::Users => (take("name"), take("email")),
            Collection::Mascotas => (take("name"), take("species")),
            Collection::Veterinarios => (take("nombre"), take("especialidad")),
        }
    }
}
