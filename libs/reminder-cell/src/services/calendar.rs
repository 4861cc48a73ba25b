use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{CreateReminderRequest, Reminder, ReminderError, UpdateReminderRequest};
use crate::services::notify::{HttpNotificationGateway, NotificationGateway};
use crate::services::sync::to_utc_parts;

/// User-facing calendar: reminders created directly, with no appointment
/// link. Derived reminders share the collection but are written by the
/// synchronizer.
pub struct ReminderCalendarService {
    supabase: Arc<SupabaseClient>,
    gateway: Arc<dyn NotificationGateway>,
}

impl ReminderCalendarService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            gateway: Arc::new(HttpNotificationGateway::new(config)),
        }
    }

    pub fn with_parts(
        supabase: Arc<SupabaseClient>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self { supabase, gateway }
    }

    /// The caller's reminders ordered by fire time; optionally only those
    /// on one UTC calendar date.
    pub async fn list_reminders(
        &self,
        user_id: Uuid,
        fecha_utc: Option<chrono::NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Reminder>, ReminderError> {
        let mut path = format!(
            "/rest/v1/recordatorios?userId=eq.{}&order=timestamp.asc",
            user_id
        );
        if let Some(fecha) = fecha_utc {
            path.push_str(&format!("&fecha=eq.{}", fecha));
        }

        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let reminders = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Reminder>, _>>()
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        Ok(reminders)
    }

    pub async fn create_reminder(
        &self,
        request: CreateReminderRequest,
        user_id: Uuid,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Reminder, ReminderError> {
        if request.descripcion.trim().is_empty() {
            return Err(ReminderError::Validation(
                "descripcion must not be empty".to_string(),
            ));
        }
        if request.hora.trim().is_empty() {
            return Err(ReminderError::Validation("hora must not be empty".to_string()));
        }

        let (fecha_utc, hora_utc, timestamp) =
            to_utc_parts(request.fecha, &request.hora, request.tz_offset_minutes);

        // Manual reminders have no appointment to derive an id from; the
        // creation instant is unique enough per user and sits far above
        // the derived-id ranges.
        let notification_id = now_utc.timestamp_millis();

        let data = json!({
            "fecha": fecha_utc,
            "hora": hora_utc,
            "descripcion": request.descripcion,
            "timestamp": timestamp,
            "notificationId": notification_id,
            "citaId": null,
            "estadoCita": null,
            "userId": user_id,
        });

        let row = self
            .supabase
            .insert_returning("recordatorios", data, auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let reminder: Reminder =
            serde_json::from_value(row).map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        self.schedule_if_future(&reminder, now_utc).await;

        Ok(reminder)
    }

    pub async fn update_reminder(
        &self,
        reminder_id: Uuid,
        request: UpdateReminderRequest,
        user_id: Uuid,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Reminder, ReminderError> {
        let existing = self.get_owned(reminder_id, user_id, auth_token).await?;

        let fecha = request.fecha.unwrap_or(existing.fecha);
        let hora = request.hora.unwrap_or_else(|| existing.hora.clone());
        let descripcion = request
            .descripcion
            .unwrap_or_else(|| existing.descripcion.clone());

        if descripcion.trim().is_empty() {
            return Err(ReminderError::Validation(
                "descripcion must not be empty".to_string(),
            ));
        }

        let (fecha_utc, hora_utc, timestamp) =
            to_utc_parts(fecha, &hora, request.tz_offset_minutes);

        let row = self
            .supabase
            .update_returning(
                "recordatorios",
                &reminder_id.to_string(),
                json!({
                    "fecha": fecha_utc,
                    "hora": hora_utc,
                    "descripcion": descripcion,
                    "timestamp": timestamp,
                }),
                auth_token,
            )
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let updated: Reminder =
            serde_json::from_value(row).map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        // Rescheduling keeps the original notification id: cancel the old
        // instance, then schedule at the new fire time.
        if let Err(e) = self.gateway.cancel(existing.notification_id).await {
            warn!("failed to cancel notification {}: {}", existing.notification_id, e);
        }
        self.schedule_if_future(&updated, now_utc).await;

        Ok(updated)
    }

    pub async fn delete_reminder(
        &self,
        reminder_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ReminderError> {
        let existing = self.get_owned(reminder_id, user_id, auth_token).await?;

        self.supabase
            .delete("recordatorios", &reminder_id.to_string(), auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        if let Err(e) = self.gateway.cancel(existing.notification_id).await {
            warn!("failed to cancel notification {}: {}", existing.notification_id, e);
        }

        debug!("reminder {} deleted", reminder_id);
        Ok(())
    }

    async fn get_owned(
        &self,
        reminder_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Reminder, ReminderError> {
        let path = format!(
            "/rest/v1/recordatorios?id=eq.{}&userId=eq.{}",
            reminder_id, user_id
        );
        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(ReminderError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ReminderError::DatabaseError(e.to_string()))
    }

    async fn schedule_if_future(&self, reminder: &Reminder, now_utc: DateTime<Utc>) {
        let fire_at = match Utc.timestamp_millis_opt(reminder.timestamp).single() {
            Some(t) => t,
            None => return,
        };
        if fire_at <= now_utc {
            debug!("reminder {} fires in the past, not scheduling", reminder.id);
            return;
        }
        if let Err(e) = self
            .gateway
            .schedule(reminder.notification_id, "Recordatorio", &reminder.descripcion, fire_at)
            .await
        {
            warn!("failed to schedule notification {}: {}", reminder.notification_id, e);
        }
    }
}
