//! HTTP adapter for the hosted payment gateway.
//!
//! The gateway exposes a Stripe-shaped REST surface: checkout sessions are
//! created with form-encoded nested keys, retrieved by id, and listed by the
//! payment-intent id that webhook events reference. All calls are bounded by
//! the client-level timeout so a slow gateway cannot wedge order placement.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// One line of a hosted checkout session. `unit_amount` is in minor units.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

/// Inputs for opening a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata_user_id: String,
    pub metadata_order_items: String,
}

/// A checkout session as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: Option<String>,
    pub payment_intent: Option<PaymentIntent>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// First payment method type of the expanded intent, when present.
    pub fn payment_method(&self) -> Option<&str> {
        match self.payment_intent.as_ref()? {
            PaymentIntent::Expanded(intent) => {
                intent.payment_method_types.first().map(String::as_str)
            }
            PaymentIntent::Id(_) => None,
        }
    }
}

/// The gateway returns the intent as a bare id unless expansion is requested.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PaymentIntent {
    Expanded(PaymentIntentObject),
    Id(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

/// Opaque metadata attached at session creation and read back during
/// reconciliation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "orderItems")]
    pub order_items: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    data: Vec<CheckoutSession>,
}

/// Client for the payment gateway REST API.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    secret: Option<String>,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ServiceError::InternalError(format!("Failed to build gateway HTTP client: {}", e))
        })?;
        Ok(Self::with_client(base_url, secret, client))
    }

    /// Construct with an injected client, for tests that point at a mock server.
    pub fn with_client(base_url: impl Into<String>, secret: Option<String>, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            &config.payment_gateway_url,
            config.payment_gateway_secret.clone(),
            Duration::from_secs(config.payment_gateway_timeout_secs),
        )
    }

    /// Open a hosted checkout session.
    #[instrument(skip(self, request))]
    pub async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let params = session_form(request);
        let url = format!("{}/v1/checkout/sessions", self.base_url);

        let response = self
            .authorized(self.client.post(&url))
            .form(&params)
            .send()
            .await
            .map_err(gateway_unreachable)?;

        Self::parse_session(response).await
    }

    /// Fetch a session by id, expanding the payment intent so the settled
    /// payment method is visible.
    #[instrument(skip(self))]
    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        let url = format!("{}/v1/checkout/sessions/{}", self.base_url, session_id);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("expand[]", "payment_intent")])
            .send()
            .await
            .map_err(gateway_unreachable)?;

        Self::parse_session(response).await
    }

    /// Look up the session that a payment intent belongs to. Webhook events
    /// carry only the intent id, so this is how reconciliation recovers the
    /// session metadata.
    #[instrument(skip(self))]
    pub async fn find_session_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSession>, ServiceError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("payment_intent", payment_intent_id), ("limit", "1")])
            .send()
            .await
            .map_err(gateway_unreachable)?;

        let response = check_status(response).await?;
        let list: SessionList = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed gateway response: {}", e))
        })?;

        Ok(list.data.into_iter().next())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    async fn parse_session(response: reqwest::Response) -> Result<CheckoutSession, ServiceError> {
        let response = check_status(response).await?;
        response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed gateway response: {}", e))
        })
    }
}

/// Flatten a session request into the gateway's bracketed form encoding.
fn session_form(request: &CreateSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "payment_method_types[0]".to_string(),
            "card".to_string(),
        ),
        (
            "metadata[userId]".to_string(),
            request.metadata_user_id.clone(),
        ),
        (
            "metadata[orderItems]".to_string(),
            request.metadata_order_items.clone(),
        ),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        params.push((
            format!("line_items[{}][price_data][currency]", i),
            request.currency.clone(),
        ));
        params.push((
            format!("line_items[{}][price_data][product_data][name]", i),
            item.name.clone(),
        ));
        params.push((
            format!("line_items[{}][price_data][unit_amount]", i),
            item.unit_amount.to_string(),
        ));
        params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
    }

    params
}

fn gateway_unreachable(err: reqwest::Error) -> ServiceError {
    ServiceError::ExternalServiceError(format!("Gateway request failed: {}", err))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Gateway returned {}: {}", status, body);
    Err(ServiceError::ExternalServiceError(format!(
        "Gateway returned {}",
        status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateSessionRequest {
        CreateSessionRequest {
            currency: "usd".to_string(),
            line_items: vec![
                SessionLineItem {
                    name: "Tomatoes".to_string(),
                    unit_amount: 1020,
                    quantity: 2,
                },
                SessionLineItem {
                    name: "Potatoes".to_string(),
                    unit_amount: 510,
                    quantity: 1,
                },
            ],
            success_url: "https://shop.test/loading?session_id={CHECKOUT_SESSION_ID}&payment_success=true"
                .to_string(),
            cancel_url: "https://shop.test/cart".to_string(),
            metadata_user_id: "user-1".to_string(),
            metadata_order_items: "[]".to_string(),
        }
    }

    fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn session_form_flattens_line_items() {
        let params = session_form(&sample_request());

        assert_eq!(lookup(&params, "mode"), Some("payment"));
        assert_eq!(
            lookup(&params, "line_items[0][price_data][product_data][name]"),
            Some("Tomatoes")
        );
        assert_eq!(
            lookup(&params, "line_items[0][price_data][unit_amount]"),
            Some("1020")
        );
        assert_eq!(lookup(&params, "line_items[0][quantity]"), Some("2"));
        assert_eq!(
            lookup(&params, "line_items[1][price_data][currency]"),
            Some("usd")
        );
        assert_eq!(lookup(&params, "metadata[userId]"), Some("user-1"));
    }

    #[test]
    fn session_form_preserves_redirect_placeholder() {
        let params = session_form(&sample_request());
        let success = lookup(&params, "success_url").unwrap();
        assert!(success.contains("{CHECKOUT_SESSION_ID}"));
    }

    #[test]
    fn payment_intent_deserializes_both_shapes() {
        let bare: CheckoutSession =
            serde_json::from_str(r#"{"id": "cs_1", "payment_intent": "pi_1"}"#).unwrap();
        assert!(matches!(
            bare.payment_intent,
            Some(PaymentIntent::Id(ref id)) if id == "pi_1"
        ));
        assert_eq!(bare.payment_method(), None);

        let expanded: CheckoutSession = serde_json::from_str(
            r#"{
                "id": "cs_2",
                "payment_status": "paid",
                "payment_intent": {"id": "pi_2", "payment_method_types": ["card"]},
                "amount_total": 2040,
                "currency": "usd"
            }"#,
        )
        .unwrap();
        assert!(expanded.is_paid());
        assert_eq!(expanded.payment_method(), Some("card"));
    }

    #[test]
    fn missing_metadata_defaults_to_empty() {
        let session: CheckoutSession = serde_json::from_str(r#"{"id": "cs_3"}"#).unwrap();
        assert!(session.metadata.user_id.is_none());
        assert!(session.metadata.order_items.is_none());
    }
}
