use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AppointmentRef, Reminder, ReminderError};
use crate::services::notify::{HttpNotificationGateway, NotificationGateway};

/// Cancellation notifications live in their own id range above this offset;
/// derived ids stay strictly below it, so the two can never collide.
pub const CANCEL_NOTIFICATION_OFFSET: i64 = 500_000;

/// Deterministic notification id for an appointment-derived reminder: the
/// full appointment UUID folded through FNV-1a and reduced into
/// `[0, CANCEL_NOTIFICATION_OFFSET)`. Re-deriving is idempotent by
/// construction. Distinct appointments can still collide within the range;
/// an outstanding-id registry was deliberately not introduced.
pub fn notification_id_for(cita_id: &Uuid) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in cita_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    (hash % CANCEL_NOTIFICATION_OFFSET as u64) as i64
}

/// Normalize a locally-authored (date, time-label) pair to its UTC date,
/// UTC "HH:MM" label and epoch milliseconds. A label that does not parse
/// as HH:MM anchors to midnight.
pub fn to_utc_parts(
    fecha: NaiveDate,
    hora: &str,
    tz_offset_minutes: i32,
) -> (NaiveDate, String, i64) {
    let time = NaiveTime::parse_from_str(hora, "%H:%M").unwrap_or_else(|_| {
        warn!("time label {:?} is not HH:MM, anchoring to midnight", hora);
        NaiveTime::MIN
    });

    let offset = FixedOffset::east_opt(tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let local = fecha.and_time(time);
    let utc = match offset.from_local_datetime(&local).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Unreachable for fixed offsets, but never worth a panic.
        None => Utc.from_utc_datetime(&local),
    };

    (
        utc.date_naive(),
        utc.format("%H:%M").to_string(),
        utc.timestamp_millis(),
    )
}

/// Keeps a `recordatorios` document and its device notification consistent
/// with the appointment it mirrors.
pub struct ReminderSyncService {
    supabase: Arc<SupabaseClient>,
    gateway: Arc<dyn NotificationGateway>,
}

impl ReminderSyncService {
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

    /// Derive and persist the reminder for a freshly created appointment,
    /// then schedule its notification. Part of the appointment-create
    /// contract.
    pub async fn create_for_appointment(
        &self,
        source: &AppointmentRef,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Reminder, ReminderError> {
        let descripcion = format!(
            "Cita de {} con {} - {}",
            source.pet_name, source.vet_name, source.motivo
        );
        let (fecha_utc, hora_utc, timestamp) =
            to_utc_parts(source.fecha, &source.hora, source.tz_offset_minutes);
        let notification_id = notification_id_for(&source.cita_id);

        let data = json!({
            "fecha": fecha_utc,
            "hora": hora_utc,
            "descripcion": descripcion,
            "timestamp": timestamp,
            "notificationId": notification_id,
            "citaId": source.cita_id,
            "estadoCita": source.estado,
            "userId": source.user_id,
        });

        let row = self
            .supabase
            .insert_returning("recordatorios", data, auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let reminder: Reminder =
            serde_json::from_value(row).map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        self.schedule_notification(&reminder, now_utc).await;

        debug!(
            "reminder {} derived for cita {} (notification {})",
            reminder.id, source.cita_id, notification_id
        );
        Ok(reminder)
    }

    /// Schedule the device notification for a reminder whose fire time is
    /// still ahead. Past-dated reminders are silently skipped. Gateway
    /// failures are logged, not propagated; the scheduler is
    /// fire-and-forget from the caller's point of view.
    pub async fn schedule_notification(&self, reminder: &Reminder, now_utc: DateTime<Utc>) {
        let fire_at = match Utc.timestamp_millis_opt(reminder.timestamp).single() {
            Some(t) => t,
            None => {
                warn!("reminder {} has unusable timestamp {}", reminder.id, reminder.timestamp);
                return;
            }
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

    /// React to an appointment cancellation: annotate the linked reminder,
    /// mirror the status, drop its scheduled notification and fire the
    /// offset cancellation notice. The reminder document is never deleted;
    /// an absent reminder makes this a no-op.
    pub async fn on_appointment_cancelled(
        &self,
        cita_id: Uuid,
        motivo: &str,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), ReminderError> {
        let path = format!("/rest/v1/recordatorios?citaId=eq.{}", cita_id);
        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        let mut reminders = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Reminder>(row) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("skipping undecodable recordatorio for cita {}: {}", cita_id, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        let reminder = match reminders.len() {
            0 => {
                // Manual reminder or deleted out-of-band; cancellation of
                // the appointment must not be blocked.
                debug!("no reminder linked to cita {}, nothing to sync", cita_id);
                return Ok(());
            }
            1 => reminders.remove(0),
            n => {
                warn!(
                    "data anomaly: {} reminders linked to cita {}, operating on the first",
                    n, cita_id
                );
                for extra in &reminders[1..] {
                    warn!("  extra reminder {} left untouched", extra.id);
                }
                reminders.remove(0)
            }
        };

        let descripcion = format!("{} (CANCELADA - Motivo: {})", reminder.descripcion, motivo);
        self.supabase
            .update_returning(
                "recordatorios",
                &reminder.id.to_string(),
                json!({
                    "descripcion": descripcion,
                    "estadoCita": "cancelada",
                }),
                auth_token,
            )
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        if let Err(e) = self.gateway.cancel(reminder.notification_id).await {
            warn!("failed to cancel notification {}: {}", reminder.notification_id, e);
        }

        let cancel_id = reminder.notification_id + CANCEL_NOTIFICATION_OFFSET;
        let body = format!("Tu cita fue cancelada. Motivo: {}", motivo);
        if let Err(e) = self.gateway.schedule(cancel_id, "Cita cancelada", &body, now_utc).await {
            warn!("failed to send cancellation notification {}: {}", cancel_id, e);
        }

        info!("reminder {} annotated for cancelled cita {}", reminder.id, cita_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_id_is_deterministic() {
        let cita_id = Uuid::new_v4();
        assert_eq!(notification_id_for(&cita_id), notification_id_for(&cita_id));
    }

    #[test]
    fn notification_id_stays_below_the_cancel_range() {
        for _ in 0..1000 {
            let id = notification_id_for(&Uuid::new_v4());
            assert!((0..CANCEL_NOTIFICATION_OFFSET).contains(&id));
            assert!(id + CANCEL_NOTIFICATION_OFFSET >= CANCEL_NOTIFICATION_OFFSET);
        }
    }

    #[test]
    fn utc_parts_shift_across_midnight() {
        // 23:30 at +02:00 is 21:30 UTC the same day...
        let fecha = NaiveDate::from_ymd_opt(2030, 6, 3).unwrap();
        let (date, label, _) = to_utc_parts(fecha, "23:30", 120);
        assert_eq!(date, fecha);
        assert_eq!(label, "21:30");

        // ...while 00:30 at +02:00 falls back to the previous UTC day.
        let (date, label, _) = to_utc_parts(fecha, "00:30", 120);
        assert_eq!(date, NaiveDate::from_ymd_opt(2030, 6, 2).unwrap());
        assert_eq!(label, "22:30");
    }

    #[test]
    fn utc_parts_anchor_bad_labels_to_midnight() {
        let fecha = NaiveDate::from_ymd_opt(2030, 6, 3).unwrap();
        let (date, label, ts) = to_utc_parts(fecha, "primera hora", 0);
        assert_eq!(date, fecha);
        assert_eq!(label, "00:00");
        assert_eq!(
            ts,
            fecha.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
        );
    }
}
