use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    weekday_from_name, CreateProviderRequest, Especialidad, Provider, UpdateProviderRequest,
};

/// Administration of the `veterinarios` collection. Providers are created
/// and edited by operators; the resolver only reads them.
pub struct ProviderAdminService {
    supabase: Arc<SupabaseClient>,
}

impl ProviderAdminService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn list_providers(&self, auth_token: &str) -> Result<Vec<Provider>> {
        let rows = self
            .supabase
            .select("/rest/v1/veterinarios?order=nombre.asc", auth_token)
            .await?;

        let providers = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Provider>, _>>()?;

        Ok(providers)
    }

    pub async fn create_provider(
        &self,
        request: CreateProviderRequest,
        auth_token: &str,
    ) -> Result<Provider> {
        debug!("Creating provider {}", request.nombre);

        if request.nombre.trim().is_empty() {
            return Err(anyhow!("Provider name must not be empty"));
        }
        if request.especialidad.trim().is_empty() {
            return Err(anyhow!("Provider specialty must not be empty"));
        }
        validate_schedule(&request.dias_laborales, &request.horarios_laborales)?;

        // Persist hours only for declared days; entries outside the
        // working-days list are meaningless by contract.
        let horarios: HashMap<&String, &Vec<String>> = request
            .horarios_laborales
            .iter()
            .filter(|(dia, _)| request.dias_laborales.contains(dia))
            .collect();

        let data = json!({
            "nombre": request.nombre,
            "especialidad": request.especialidad,
            "foto": request.foto,
            "diasLaborales": request.dias_laborales,
            "horariosLaborales": horarios,
            "disponible": request.disponible,
        });

        let row = self
            .supabase
            .insert_returning("veterinarios", data, auth_token)
            .await?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn update_provider(
        &self,
        provider_id: Uuid,
        request: UpdateProviderRequest,
        auth_token: &str,
    ) -> Result<Provider> {
        debug!("Updating provider {}", provider_id);

        let mut update_data = serde_json::Map::new();

        if let Some(nombre) = request.nombre {
            if nombre.trim().is_empty() {
                return Err(anyhow!("Provider name must not be empty"));
            }
            update_data.insert("nombre".to_string(), json!(nombre));
        }
        if let Some(especialidad) = request.especialidad {
            update_data.insert("especialidad".to_string(), json!(especialidad));
        }
        if let Some(foto) = request.foto {
            update_data.insert("foto".to_string(), json!(foto));
        }
        if let Some(ref dias) = request.dias_laborales {
            let horarios = request.horarios_laborales.clone().unwrap_or_default();
            validate_schedule(dias, &horarios)?;
            update_data.insert("diasLaborales".to_string(), json!(dias));
            update_data.insert("horariosLaborales".to_string(), json!(horarios));
        }
        if let Some(disponible) = request.disponible {
            update_data.insert("disponible".to_string(), json!(disponible));
        }

        let row = self
            .supabase
            .update_returning(
                "veterinarios",
                &provider_id.to_string(),
                Value::Object(update_data),
                auth_token,
            )
            .await?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete_provider(&self, provider_id: Uuid, auth_token: &str) -> Result<()> {
        debug!("Deleting provider {}", provider_id);
        self.supabase
            .delete("veterinarios", &provider_id.to_string(), auth_token)
            .await?;
        Ok(())
    }

    pub async fn set_disponible(
        &self,
        provider_id: Uuid,
        disponible: bool,
        auth_token: &str,
    ) -> Result<Provider> {
        let row = self
            .supabase
            .update_returning(
                "veterinarios",
                &provider_id.to_string(),
                json!({ "disponible": disponible }),
                auth_token,
            )
            .await?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn list_especialidades(&self, auth_token: &str) -> Result<Vec<Especialidad>> {
        let rows = self
            .supabase
            .select("/rest/v1/especialidades?order=nombre.asc", auth_token)
            .await?;

        let especialidades = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Especialidad>, _>>()?;

        Ok(especialidades)
    }
}

fn validate_schedule(
    dias_laborales: &[String],
    horarios_laborales: &HashMap<String, Vec<String>>,
) -> Result<()> {
    for dia in dias_laborales {
        if weekday_from_name(dia).is_none() {
            return Err(anyhow!("Unknown working day: {}", dia));
        }
    }
    for dia in horarios_laborales.keys() {
        if weekday_from_name(dia).is_none() {
            return Err(anyhow!("Unknown day in working hours: {}", dia));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_with_unknown_day_is_rejected() {
        let dias = vec!["Lunes".to_string(), "Caturday".to_string()];
        assert!(validate_schedule(&dias, &HashMap::new()).is_err());
    }

    #[test]
    fn schedule_with_known_days_passes() {
        let dias = vec!["Lunes".to_string(), "Viernes".to_string()];
        let mut horarios = HashMap::new();
        horarios.insert("Lunes".to_string(), vec!["09:00".to_string()]);
        assert!(validate_schedule(&dias, &horarios).is_ok());
    }
}
