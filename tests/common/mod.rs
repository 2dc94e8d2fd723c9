#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db,
    entities::{address, product, user},
    events::{self, EventSender},
    gateway::GatewayClient,
    services::AppServices,
    AppState,
};

pub const TEST_JWT_SECRET: &str =
    "integration_test_secret_key_that_is_at_least_64_characters_long_0123456789";
pub const WEBHOOK_SECRET: &str = "whsec_integration_test_secret";

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database. Each instance owns its own temp directory, so tests run
/// independently and in parallel.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application whose gateway client points at an
    /// unroutable address. Tests that exercise the gateway use
    /// `with_gateway_url` with a mock server instead.
    pub async fn new() -> Self {
        Self::with_gateway_url("http://127.0.0.1:9").await
    }

    /// Construct a test application with the payment gateway pointed at the
    /// given base URL (typically a wiremock server).
    pub async fn with_gateway_url(gateway_url: &str) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_gateway_url = gateway_url.to_string();
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(
            GatewayClient::new(gateway_url, None, Duration::from_secs(5))
                .expect("build gateway client for tests"),
        );
        let services =
            AppServices::with_gateway(db_arc.clone(), &cfg, event_sender.clone(), gateway);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes(&state))
            .layer(axum::middleware::from_fn(
                storefront_api::middleware::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Insert a buyer with an empty cart and return their id.
    pub async fn seed_user(&self, name: &str, email: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(user_id),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set("not-a-real-hash".to_string()),
            cart_items: Set(user::empty_cart()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user");
        user_id
    }

    pub async fn seed_product(&self, name: &str, offer_price: Decimal) -> product::Model {
        self.seed_product_in_category(name, offer_price, "vegetables")
            .await
    }

    pub async fn seed_product_in_category(
        &self,
        name: &str,
        offer_price: Decimal,
        category: &str,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(serde_json::json!(["Seeded for integration tests"])),
            price: Set(offer_price + Decimal::ONE),
            offer_price: Set(offer_price),
            images: Set(serde_json::json!([])),
            category: Set(category.to_string()),
            in_stock: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> Uuid {
        let address_id = Uuid::new_v4();
        address::ActiveModel {
            id: Set(address_id),
            user_id: Set(user_id),
            first_name: Set("Asha".to_string()),
            last_name: Set("Iyer".to_string()),
            email: Set("asha@example.com".to_string()),
            street: Set("12 Harbor Lane".to_string()),
            city: Set("Springfield".to_string()),
            state: Set("IL".to_string()),
            zipcode: Set("62704".to_string()),
            country: Set("US".to_string()),
            phone: Set("5551234567".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address");
        address_id
    }

    /// Bearer token for a plain buyer.
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .services
            .auth
            .issue_token(user_id, Vec::new())
            .expect("issue buyer token")
    }

    /// Bearer token carrying the admin role.
    pub fn admin_token_for(&self, user_id: Uuid) -> String {
        self.state
            .services
            .auth
            .issue_token(user_id, vec!["admin".to_string()])
            .expect("issue admin token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, token, &[])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Deliver a raw webhook payload with the given headers.
    pub async fn post_webhook(
        &self,
        payload: &str,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(Body::from(payload.to_string()))
            .expect("failed to build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Deliver a webhook payload signed with the test secret.
    pub async fn post_signed_webhook(&self, payload: &str) -> axum::response::Response {
        let (ts, sig) = sign_webhook(payload);
        self.post_webhook(
            payload,
            &[("x-timestamp", ts.as_str()), ("x-signature", sig.as_str())],
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Sign a webhook payload the way the gateway does: HMAC-SHA256 over
/// "{timestamp}.{payload}" with the shared secret, hex-encoded.
pub fn sign_webhook(payload: &str) -> (String, String) {
    let ts = Utc::now().timestamp().to_string();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("construct webhook mac");
    mac.update(format!("{}.{}", ts, payload).as_bytes());
    (ts, hex::encode(mac.finalize().into_bytes()))
}
