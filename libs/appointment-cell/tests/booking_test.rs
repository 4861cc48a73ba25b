use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mockall::predicate::eq;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, CreateAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use reminder_cell::services::notify::{NotificationGateway, NotifyError};
use reminder_cell::services::sync::notification_id_for;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_utils::test_utils::{MockStoreRows, TestConfig, TestUser};

mockall::mock! {
    pub Gateway {}

    #[async_trait]
    impl NotificationGateway for Gateway {
        async fn schedule(
            &self,
            id: i64,
            title: &str,
            body: &str,
            fire_at: DateTime<Utc>,
        ) -> Result<(), NotifyError>;

        async fn cancel(&self, id: i64) -> Result<(), NotifyError>;

        async fn send_to_user(
            &self,
            user_id: Uuid,
            title: &str,
            body: &str,
        ) -> Result<(), NotifyError>;
    }
}

fn service_with(mock_server: &MockServer, gateway: MockGateway) -> AppointmentBookingService {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let supabase = Arc::new(SupabaseClient::new(&config.to_app_config()));
    AppointmentBookingService::with_parts(supabase, Arc::new(gateway))
}

fn relaxed_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_schedule().returning(|_, _, _, _| Ok(()));
    gateway.expect_cancel().returning(|_| Ok(()));
    gateway.expect_send_to_user().returning(|_, _, _| Ok(()));
    gateway
}

fn fixed_now(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

/// 2030-06-03 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

struct Ids {
    provider: Uuid,
    pet: Uuid,
    user: Uuid,
    cita: Uuid,
}

impl Ids {
    fn new() -> Self {
        Self {
            provider: Uuid::new_v4(),
            pet: Uuid::new_v4(),
            user: Uuid::new_v4(),
            cita: Uuid::new_v4(),
        }
    }

    fn caller(&self) -> User {
        User {
            id: self.user.to_string(),
            email: Some("owner@example.com".to_string()),
            role: Some("user".to_string()),
            metadata: None,
            created_at: None,
        }
    }

    fn request(&self) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            veterinario_id: Some(self.provider),
            fecha: Some(monday()),
            hora: Some("10:00".to_string()),
            motivo: Some("Vacuna anual".to_string()),
            pet_id: Some(self.pet),
            user_id: Some(self.user),
            tz_offset_minutes: 0,
        }
    }

    fn cita_row(&self, estado: &str) -> serde_json::Value {
        let mut row = MockStoreRows::cita(
            &self.cita.to_string(),
            &self.provider.to_string(),
            &self.pet.to_string(),
            &self.user.to_string(),
            "2030-06-03",
            "10:00",
            estado,
        );
        row["motivo"] = json!("Vacuna anual");
        row
    }

    async fn mount_booking_reads(&self, mock_server: &MockServer, occupied: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/mascotas"))
            .and(query_param("id", format!("eq.{}", self.pet)))
            .and(query_param("userId", format!("eq.{}", self.user)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockStoreRows::mascota(&self.pet.to_string(), &self.user.to_string(), "Michi", "Gato")
            ])))
            .mount(mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/veterinarios"))
            .and(query_param("id", format!("eq.{}", self.provider)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockStoreRows::veterinario(&self.provider.to_string(), "Dra. Lopez", "General")
            ])))
            .mount(mock_server)
            .await;

        let rows: Vec<_> = occupied.iter().map(|h| json!({ "hora": h })).collect();
        Mock::given(method("GET"))
            .and(path("/rest/v1/citas"))
            .and(query_param("veterinarioId", format!("eq.{}", self.provider)))
            .and(query_param("estado", "neq.cancelada"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
            .mount(mock_server)
            .await;
    }
}

#[tokio::test]
async fn booking_persists_pending_and_derives_the_reminder() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();
    ids.mount_booking_reads(&mock_server, &[]).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .and(body_partial_json(json!({
            "veterinarioId": ids.provider,
            "fecha": "2030-06-03",
            "hora": "10:00",
            "estado": "pendiente",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ids.cita_row("pendiente")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The reminder write is part of the create contract.
    Mock::given(method("POST"))
        .and(path("/rest/v1/recordatorios"))
        .and(body_partial_json(json!({
            "citaId": ids.cita,
            "notificationId": notification_id_for(&ids.cita),
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreRows::recordatorio(
                &Uuid::new_v4().to_string(),
                Some(&ids.cita.to_string()),
                &ids.user.to_string(),
                notification_id_for(&ids.cita),
                "Cita de Michi con Dra. Lopez - Vacuna anual",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let expected_notification = notification_id_for(&ids.cita);
    let mut gateway = MockGateway::new();
    gateway
        .expect_schedule()
        .withf(move |id, _, _, _| *id == expected_notification)
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let service = service_with(&mock_server, gateway);
    let appointment = service
        .create_appointment(
            ids.request(),
            &ids.caller(),
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.estado, AppointmentStatus::Pending);
    assert_eq!(appointment.hora, "10:00");
}

#[tokio::test]
async fn booking_rejects_with_every_missing_field_named() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    let service = service_with(&mock_server, relaxed_gateway());
    let err = service
        .create_appointment(
            CreateAppointmentRequest::default(),
            &ids.caller(),
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap_err();

    match err {
        AppointmentError::MissingFields(fields) => {
            assert!(fields.contains("veterinarioId"));
            assert!(fields.contains("motivo"));
            assert!(fields.contains("userId"));
        }
        other => panic!("expected MissingFields, got {:?}", other),
    }
}

#[tokio::test]
async fn booking_someone_elses_appointment_is_rejected() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    let stranger = TestUser::user("stranger@example.com").to_user();

    let service = service_with(&mock_server, relaxed_gateway());
    let err = service
        .create_appointment(
            ids.request(),
            &stranger,
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::Unauthorized);
}

#[tokio::test]
async fn booking_an_occupied_slot_is_rejected_before_the_write() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();
    ids.mount_booking_reads(&mock_server, &["10:00"]).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, relaxed_gateway());
    let err = service
        .create_appointment(
            ids.request(),
            &ids.caller(),
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::SlotNotAvailable);
}

#[tokio::test]
async fn concurrent_double_booking_loses_to_the_uniqueness_guard() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();
    // The recheck still sees the slot as free (the other writer has not
    // landed yet when we read)...
    ids.mount_booking_reads(&mock_server, &[]).await;

    // ...but the store's unique index has, and answers 409.
    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            "duplicate key value violates unique constraint \"citas_slot_key\"",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, relaxed_gateway());
    let err = service
        .create_appointment(
            ids.request(),
            &ids.caller(),
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::SlotNotAvailable);
}

#[tokio::test]
async fn cancellation_updates_state_and_notifies() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();
    let reminder_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .and(query_param("id", format!("eq.{}", ids.cita)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ids.cita_row("pendiente")])))
        .mount(&mock_server)
        .await;

    let mut cancelled_row = ids.cita_row("cancelada");
    cancelled_row["motivoCancelacion"] = json!("Clinic closed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/citas"))
        .and(query_param("id", format!("eq.{}", ids.cita)))
        .and(body_partial_json(json!({
            "estado": "cancelada",
            "motivoCancelacion": "Clinic closed",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled_row])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/recordatorios"))
        .and(query_param("citaId", format!("eq.{}", ids.cita)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreRows::recordatorio(
                &reminder_id.to_string(),
                Some(&ids.cita.to_string()),
                &ids.user.to_string(),
                4321,
                "Cita de Michi con Dra. Lopez - Vacuna anual",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/recordatorios"))
        .and(query_param("id", format!("eq.{}", reminder_id)))
        .and(body_partial_json(json!({ "estadoCita": "cancelada" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreRows::recordatorio(
                &reminder_id.to_string(),
                Some(&ids.cita.to_string()),
                &ids.user.to_string(),
                4321,
                "Cita de Michi con Dra. Lopez - Vacuna anual (CANCELADA - Motivo: Clinic closed)",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut gateway = MockGateway::new();
    gateway
        .expect_cancel()
        .with(eq(4321_i64))
        .times(1)
        .returning(|_| Ok(()));
    gateway
        .expect_schedule()
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    let owner = ids.user;
    gateway
        .expect_send_to_user()
        .withf(move |user_id, title, body, | {
            *user_id == owner && title == "Cita cancelada" && body.contains("Clinic closed")
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let service = service_with(&mock_server, gateway);
    let cancelled = service
        .cancel_appointment(
            ids.cita,
            "Clinic closed",
            fixed_now("2026-01-01T00:00:00Z"),
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(cancelled.estado, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.motivo_cancelacion.as_deref(), Some("Clinic closed"));
}

#[tokio::test]
async fn cancellation_requires_a_reason() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    let service = service_with(&mock_server, relaxed_gateway());
    let err = service
        .cancel_appointment(ids.cita, "   ", fixed_now("2026-01-01T00:00:00Z"), "test-token")
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::ValidationError(_));
}

#[tokio::test]
async fn terminal_appointments_reject_cancellation_without_a_write() {
    let ids = Ids::new();

    for estado in ["cancelada", "completada"] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/citas"))
            .and(query_param("id", format!("eq.{}", ids.cita)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([ids.cita_row(estado)])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/citas"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let service = service_with(&server, relaxed_gateway());
        let err = service
            .cancel_appointment(
                ids.cita,
                "Clinic closed",
                fixed_now("2026-01-01T00:00:00Z"),
                "test-token",
            )
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::InvalidStatusTransition(_));
    }
}

#[tokio::test]
async fn confirm_and_complete_follow_the_transition_table() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .and(query_param("id", format!("eq.{}", ids.cita)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ids.cita_row("pendiente")])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/citas"))
        .and(body_partial_json(json!({ "estado": "confirmada" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ids.cita_row("confirmada")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, relaxed_gateway());
    let confirmed = service
        .update_status(ids.cita, AppointmentStatus::Confirmed, "test-token")
        .await
        .unwrap();
    assert_eq!(confirmed.estado, AppointmentStatus::Confirmed);

    // Cancellation has a dedicated operation; the generic transition
    // endpoint refuses it.
    let err = service
        .update_status(ids.cita, AppointmentStatus::Cancelled, "test-token")
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::ValidationError(_));
}

#[tokio::test]
async fn listing_puts_active_first_and_degrades_enrichment_per_field() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    let row = |id: &Uuid, fecha: &str, hora: &str, estado: &str| {
        MockStoreRows::cita(
            &id.to_string(),
            &ids.provider.to_string(),
            &ids.pet.to_string(),
            &ids.user.to_string(),
            fecha,
            hora,
            estado,
        )
    };
    let cancelled_early = Uuid::new_v4();
    let active_mid = Uuid::new_v4();
    let active_late = Uuid::new_v4();

    // Store order is (fecha, hora) ascending; the cancelled row sits first
    // there but must trail in the response.
    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(&cancelled_early, "2030-06-03", "09:00", "cancelada"),
            row(&active_mid, "2030-06-03", "10:00", "pendiente"),
            row(&active_late, "2030-06-04", "09:00", "confirmada"),
        ])))
        .mount(&mock_server)
        .await;

    // Owner lookup is down; pet and vet lookups work.
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/mascotas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreRows::mascota(&ids.pet.to_string(), &ids.user.to_string(), "Michi", "Gato")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarios"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreRows::veterinario(&ids.provider.to_string(), "Dra. Lopez", "General")
        ])))
        .mount(&mock_server)
        .await;

    let admin = TestUser::admin("ops@example.com").to_user();

    let service = service_with(&mock_server, relaxed_gateway());
    let listing = service.list_appointments(&admin, "test-token").await.unwrap();

    let order: Vec<Uuid> = listing.iter().map(|e| e.cita.id).collect();
    assert_eq!(order, vec![active_mid, active_late, cancelled_early]);

    let first = &listing[0];
    assert_eq!(first.pet_name.as_deref(), Some("Michi"));
    assert_eq!(first.vet_name.as_deref(), Some("Dra. Lopez"));
    assert_eq!(first.owner_name, None);
    assert_eq!(first.owner_email, None);
}

#[tokio::test]
async fn non_admin_listing_is_scoped_to_the_caller() {
    let mock_server = MockServer::start().await;
    let ids = Ids::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .and(query_param("userId", format!("eq.{}", ids.user)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ids.cita_row("pendiente")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, relaxed_gateway());
    let listing = service
        .list_appointments(&ids.caller(), "test-token")
        .await
        .unwrap();

    assert_eq!(listing.len(), 1);
    // No enrichment for non-admin callers.
    assert_eq!(listing[0].owner_name, None);
    assert_eq!(listing[0].pet_name, None);
}
