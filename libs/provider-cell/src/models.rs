use std::collections::HashMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Day names as the mobile app wrote them into the `veterinarios`
/// collection. Wire data is Spanish; everything past deserialization works
/// with `chrono::Weekday`.
pub const DAY_NAMES: [&str; 7] = [
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
    "Domingo",
];

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "Lunes" => Some(Weekday::Mon),
        "Martes" => Some(Weekday::Tue),
        "Miércoles" => Some(Weekday::Wed),
        "Jueves" => Some(Weekday::Thu),
        "Viernes" => Some(Weekday::Fri),
        "Sábado" => Some(Weekday::Sat),
        "Domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn day_name(weekday: Weekday) -> &'static str {
    DAY_NAMES[weekday.num_days_from_monday() as usize]
}

/// Weekly availability template as a fixed-size array indexed by weekday,
/// Monday first. Built from the wire shape (name-keyed map gated on the
/// working-days list), so an entry exists only for declared working days
/// and invalid day keys cannot occur past construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingWeek {
    days: [Vec<String>; 7],
}

impl WorkingWeek {
    /// Slot labels declared for `weekday`, in declaration order. Declaration
    /// order is authoritative and never sorted; providers may present
    /// shifts non-chronologically.
    pub fn slots_for(&self, weekday: Weekday) -> &[String] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(|d| d.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub nombre: String,
    pub especialidad: String,
    #[serde(default)]
    pub foto: Option<String>,
    #[serde(rename = "diasLaborales")]
    pub dias_laborales: Vec<String>,
    #[serde(rename = "horariosLaborales")]
    pub horarios_laborales: HashMap<String, Vec<String>>,
    pub disponible: bool,
}

impl Provider {
    /// Materialize the weekly template. `horariosLaborales[d]` is only
    /// meaningful when `d` is listed in `diasLaborales`; anything else is
    /// dropped here. Unknown day names are logged and skipped.
    pub fn working_week(&self) -> WorkingWeek {
        let mut week = WorkingWeek::default();

        for dia in &self.dias_laborales {
            let Some(weekday) = weekday_from_name(dia) else {
                warn!("provider {} declares unknown working day {:?}", self.id, dia);
                continue;
            };
            let labels = self
                .horarios_laborales
                .get(dia)
                .cloned()
                .unwrap_or_default();
            week.days[weekday.num_days_from_monday() as usize] = labels;
        }

        week
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Especialidad {
    pub id: Uuid,
    pub nombre: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProviderRequest {
    pub nombre: String,
    pub especialidad: String,
    #[serde(default)]
    pub foto: Option<String>,
    #[serde(rename = "diasLaborales")]
    pub dias_laborales: Vec<String>,
    #[serde(rename = "horariosLaborales", default)]
    pub horarios_laborales: HashMap<String, Vec<String>>,
    #[serde(default = "default_disponible")]
    pub disponible: bool,
}

fn default_disponible() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProviderRequest {
    pub nombre: Option<String>,
    pub especialidad: Option<String>,
    pub foto: Option<String>,
    #[serde(rename = "diasLaborales")]
    pub dias_laborales: Option<Vec<String>>,
    #[serde(rename = "horariosLaborales")]
    pub horarios_laborales: Option<HashMap<String, Vec<String>>>,
    pub disponible: Option<bool>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
