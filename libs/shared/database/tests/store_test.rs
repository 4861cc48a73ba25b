use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{live, StoreError, SupabaseClient};

fn client_for(mock_server: &MockServer) -> SupabaseClient {
    SupabaseClient::new(&AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "irrelevant".to_string(),
        notify_gateway_url: String::new(),
        notify_gateway_token: String::new(),
    })
}

#[tokio::test]
async fn a_unique_violation_surfaces_as_conflict() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client
        .insert_returning("citas", json!({ "hora": "10:00" }), "token")
        .await;

    assert_matches!(result, Err(StoreError::Conflict(_)));
}

#[tokio::test]
async fn missing_rows_surface_as_not_found() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client
        .update_returning("citas", "some-id", json!({ "estado": "confirmada" }), "token")
        .await;

    assert_matches!(result, Err(StoreError::NotFound(_)));
}

#[tokio::test]
async fn insert_returns_the_stored_representation() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/recordatorios"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{ "id": "abc", "hora": "10:00" }])),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let row = client
        .insert_returning("recordatorios", json!({ "hora": "10:00" }), "token")
        .await
        .unwrap();

    assert_eq!(row["hora"], "10:00");
}

#[tokio::test]
async fn live_query_publishes_replacement_snapshots() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1", "hora": "09:00" }])),
        )
        .mount(&mock_server)
        .await;

    let client = Arc::new(client_for(&mock_server));
    let mut rx = live::subscribe(
        client,
        "/rest/v1/citas".to_string(),
        "token".to_string(),
        Duration::from_millis(20),
    );

    // First non-empty snapshot replaces the initial empty list.
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("no snapshot within the deadline")
        .unwrap();

    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0]["id"], "c1");
}
