use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_cell::router::provider_routes;
use shared_utils::test_utils::{JwtTestUtils, MockStoreRows, TestConfig, TestUser};

fn test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let app = provider_routes(Arc::new(config.to_app_config()));
    (app, config)
}

#[tokio::test]
async fn listing_requires_authentication() {
    let mock_server = MockServer::start().await;
    let (app, _config) = test_app(&mock_server);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_creation_is_admin_only() {
    let mock_server = MockServer::start().await;
    let (app, config) = test_app(&mock_server);

    let user = TestUser::user("user@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let body = json!({
        "nombre": "Dra. Lopez",
        "especialidad": "General",
        "diasLaborales": ["Lunes"],
        "horariosLaborales": { "Lunes": ["09:00"] }
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn slot_listing_returns_free_labels() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarios"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreRows::veterinario(&provider_id.to_string(), "Dra. Lopez", "General")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "hora": "09:00" }])),
        )
        .mount(&mock_server)
        .await;

    let (app, config) = test_app(&mock_server);
    let user = TestUser::user("user@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    // 2030-06-03 is a Monday, far in the caller's future.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/slots?fecha=2030-06-03", provider_id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["slots"], json!(["10:00", "11:00"]));
}
