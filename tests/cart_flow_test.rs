mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn cart_replaces_previous_contents_wholesale() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Ravi", "ravi@example.com").await;
    let token = app.token_for(user_id);
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();

    let response = app
        .request(
            Method::PUT,
            "/api/v1/cart",
            Some(json!({"cart_items": {&first: 2, &second: 1}})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"][&first], json!(2));
    assert_eq!(body["data"][&second], json!(1));

    // A later update is a full replacement, not a merge.
    let response = app
        .request(
            Method::PUT,
            "/api/v1/cart",
            Some(json!({"cart_items": {&first: 5}})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"], json!({&first: 5}));
}

#[tokio::test]
async fn cart_accepts_an_empty_mapping_as_clear() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Ravi", "ravi@example.com").await;
    let token = app.token_for(user_id);

    app.request(
        Method::PUT,
        "/api/v1/cart",
        Some(json!({"cart_items": {Uuid::new_v4().to_string(): 2}})),
        Some(&token),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/cart",
            Some(json!({"cart_items": {}})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"], json!({}));
}

#[tokio::test]
async fn cart_rejects_non_positive_quantities_without_partial_writes() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Ravi", "ravi@example.com").await;
    let token = app.token_for(user_id);
    let kept = Uuid::new_v4().to_string();

    app.request(
        Method::PUT,
        "/api/v1/cart",
        Some(json!({"cart_items": {&kept: 2}})),
        Some(&token),
    )
    .await;

    for bad_quantity in [json!(0), json!(-1), json!(1.5), json!("two")] {
        let response = app
            .request(
                Method::PUT,
                "/api/v1/cart",
                Some(json!({"cart_items": {
                    Uuid::new_v4().to_string(): 1,
                    Uuid::new_v4().to_string(): bad_quantity,
                }})),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // Every rejected payload left the stored cart untouched.
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"], json!({&kept: 2}));
}

#[tokio::test]
async fn cart_rejects_malformed_product_ids() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("Ravi", "ravi@example.com").await;
    let token = app.token_for(user_id);

    let response = app
        .request(
            Method::PUT,
            "/api/v1/cart",
            Some(json!({"cart_items": {"not-a-uuid": 1}})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::PUT,
            "/api/v1/cart",
            Some(json!({"cart_items": {}})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
