use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{StoreError, SupabaseClient};

use crate::models::{Provider, ProviderError};

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        let path = format!("/rest/v1/veterinarios?id=eq.{}", provider_id);
        let rows = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(ProviderError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }

    /// Bookable slot labels for `(provider, fecha)` as seen by a caller
    /// whose local clock is `now_utc` shifted by `tz_offset_minutes`
    /// (minutes east of UTC). The clock is an explicit input, not ambient
    /// state.
    pub async fn available_slots(
        &self,
        provider_id: Uuid,
        fecha: NaiveDate,
        tz_offset_minutes: i32,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let provider = self.get_provider(provider_id, auth_token).await?;
        self.available_slots_for(&provider, fecha, tz_offset_minutes, now_utc, auth_token)
            .await
    }

    /// Same as [`available_slots`], for callers that already hold the
    /// provider document (booking revalidation fetches it anyway).
    pub async fn available_slots_for(
        &self,
        provider: &Provider,
        fecha: NaiveDate,
        tz_offset_minutes: i32,
        now_utc: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if !provider.disponible {
            debug!("provider {} is flagged unavailable", provider.id);
            return Ok(vec![]);
        }

        let week = provider.working_week();
        let declared = week.slots_for(fecha.weekday());
        if declared.is_empty() {
            return Ok(vec![]);
        }

        // Occupancy lookup fails OPEN: on a store error the full declared
        // list is returned so booking can still proceed; a genuinely
        // occupied slot is rejected again at write time by the store's
        // uniqueness guard.
        let occupied = match self.occupied_slots(provider.id, fecha, auth_token).await {
            Ok(occupied) => occupied,
            Err(e) => {
                warn!(
                    "occupancy query failed for provider {} on {}: {}; returning unfiltered slots",
                    provider.id, fecha, e
                );
                return Ok(declared.to_vec());
            }
        };

        let (today_local, now_local) = local_parts(now_utc, tz_offset_minutes);
        let cutoff = (fecha == today_local).then_some(now_local);

        Ok(filter_slots(declared, &occupied, cutoff))
    }

    async fn occupied_slots(
        &self,
        provider_id: Uuid,
        fecha: NaiveDate,
        auth_token: &str,
    ) -> Result<HashSet<String>, StoreError> {
        let path = format!(
            "/rest/v1/citas?veterinarioId=eq.{}&fecha=eq.{}&estado=neq.cancelada&select=hora",
            provider_id, fecha
        );
        let rows: Vec<Value> = self.supabase.select(&path, auth_token).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row["hora"].as_str().map(|h| h.to_string()))
            .collect())
    }
}

/// Pure slot filter: declared labels minus occupied ones, in declaration
/// order, optionally dropping labels at or before the local-time cutoff.
/// Labels that do not parse as HH:MM are kept; declaration order stays
/// authoritative either way.
pub fn filter_slots(
    declared: &[String],
    occupied: &HashSet<String>,
    cutoff: Option<NaiveTime>,
) -> Vec<String> {
    declared
        .iter()
        .filter(|label| !occupied.contains(*label))
        .filter(|label| match (cutoff, parse_label(label)) {
            (Some(now), Some(t)) => t > now,
            _ => true,
        })
        .cloned()
        .collect()
}

fn parse_label(label: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(label, "%H:%M").ok()
}

/// Calendar date and time-of-day on the caller's clock.
pub fn local_parts(now_utc: DateTime<Utc>, tz_offset_minutes: i32) -> (NaiveDate, NaiveTime) {
    let offset = FixedOffset::east_opt(tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let local = now_utc.with_timezone(&offset);
    (local.date_naive(), local.time())
}
