mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use serde_json::{json, Value};

fn address_payload(street: &str) -> Value {
    json!({
        "first_name": "Asha",
        "last_name": "Iyer",
        "email": "asha@example.com",
        "street": street,
        "city": "Springfield",
        "state": "IL",
        "zipcode": "62704",
        "country": "US",
        "phone": "5551234567",
    })
}

#[tokio::test]
async fn create_and_list_addresses_roundtrip() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Asha", "asha@example.com").await;
    let token = app.token_for(user_id);

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(address_payload("12 Harbor Lane")),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["data"]["id"].is_string());
    assert_eq!(body["data"]["street"], json!("12 Harbor Lane"));
    assert_eq!(body["data"]["user_id"], json!(user_id.to_string()));

    let response = app
        .request(Method::GET, "/api/v1/addresses", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let addresses = body["data"].as_array().expect("addresses array");
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0]["city"], json!("Springfield"));
}

#[tokio::test]
async fn addresses_list_newest_first() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Asha", "asha@example.com").await;
    let token = app.token_for(user_id);

    for street in ["1 First St", "2 Second St"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/addresses",
                Some(address_payload(street)),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .request(Method::GET, "/api/v1/addresses", None, Some(&token))
        .await;
    let body = body_json(response).await;
    let addresses = body["data"].as_array().expect("addresses array");
    assert_eq!(addresses[0]["street"], json!("2 Second St"));
    assert_eq!(addresses[1]["street"], json!("1 First St"));
}

#[tokio::test]
async fn create_rejects_incomplete_or_malformed_fields() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Asha", "asha@example.com").await;
    let token = app.token_for(user_id);

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(address_payload("")),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut payload = address_payload("12 Harbor Lane");
    payload["email"] = json!("not-an-email");
    let response = app
        .request(Method::POST, "/api/v1/addresses", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn addresses_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let asha = app.seed_user("Asha", "asha@example.com").await;
    let ravi = app.seed_user("Ravi", "ravi@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(address_payload("12 Harbor Lane")),
            Some(&app.token_for(asha)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(Method::GET, "/api/v1/addresses", None, Some(&app.token_for(ravi)))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn addresses_require_authentication() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/addresses", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/addresses",
            Some(address_payload("12 Harbor Lane")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
