use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub notify_gateway_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            notify_gateway_url: "http://localhost:54329".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            notify_gateway_url: self.notify_gateway_url.clone(),
            notify_gateway_token: "test-notify-token".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "user".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn user(email: &str) -> Self {
        Self::new(email, "user")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned store rows matching the persisted collection shapes, for wiremock
/// responses in cell tests.
pub struct MockStoreRows;

impl MockStoreRows {
    pub fn veterinario(id: &str, nombre: &str, especialidad: &str) -> serde_json::Value {
        json!({
            "id": id,
            "nombre": nombre,
            "especialidad": especialidad,
            "foto": null,
            "diasLaborales": ["Lunes", "Martes", "Miércoles", "Jueves", "Viernes"],
            "horariosLaborales": {
                "Lunes": ["09:00", "10:00", "11:00"],
                "Martes": ["09:00", "10:00", "11:00"],
                "Miércoles": ["09:00", "10:00", "11:00"],
                "Jueves": ["09:00", "10:00", "11:00"],
                "Viernes": ["09:00", "10:00", "11:00"]
            },
            "disponible": true
        })
    }

    pub fn cita(
        id: &str,
        veterinario_id: &str,
        pet_id: &str,
        user_id: &str,
        fecha: &str,
        hora: &str,
        estado: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "veterinarioId": veterinario_id,
            "fecha": fecha,
            "hora": hora,
            "motivo": "Chequeo general",
            "petId": pet_id,
            "estado": estado,
            "userId": user_id,
            "fechaCreacion": "2024-01-01T00:00:00Z",
            "motivoCancelacion": null,
            "recetaBase64": null
        })
    }

    pub fn recordatorio(
        id: &str,
        cita_id: Option<&str>,
        user_id: &str,
        notification_id: i64,
        descripcion: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "fecha": "2030-06-03",
            "hora": "10:00",
            "descripcion": descripcion,
            "timestamp": 1_906_711_200_000_i64,
            "notificationId": notification_id,
            "citaId": cita_id,
            "estadoCita": cita_id.map(|_| "pendiente"),
            "userId": user_id
        })
    }

    pub fn mascota(id: &str, user_id: &str, name: &str, species: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "nickname": name,
            "age": 3,
            "species": species,
            "breed": "Mestizo",
            "weight": 12.5,
            "chipId": "CHIP-0001",
            "userId": user_id
        })
    }

    pub fn user_row(id: &str, name: &str, email: &str, role: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "email": email,
            "role": role
        })
    }
}
