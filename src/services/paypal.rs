//! PayPal REST client: OAuth client-credentials token, order create, order capture.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v1/oauth2/token` | Access token (basic auth) |
//! | POST   | `/v2/checkout/orders` | Create order, intent CAPTURE |
//! | POST   | `/v2/checkout/orders/{id}/capture` | Capture approved order |
//! | GET    | `/v2/checkout/orders/{id}` | Order state (after `ORDER_ALREADY_CAPTURED`) |

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::UpstreamError;

const SERVICE: &str = "paypal";

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
}

#[derive(Debug, Deserialize)]
struct CapturedUnit {
    #[serde(default)]
    payments: Option<CapturedPayments>,
}

#[derive(Debug, Deserialize)]
struct CapturedPayments {
    #[serde(default)]
    captures: Vec<CaptureRecord>,
}

#[derive(Debug, Deserialize)]
struct CaptureRecord {
    id: String,
}

/// Order created on PayPal's side, waiting for buyer approval.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

/// Result of capturing an approved order.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedOrder {
    pub id: String,
    pub status: String,
    pub capture_id: Option<String>,
}

impl CapturedOrder {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

#[derive(Debug, Clone)]
pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl PayPalClient {
    pub fn new(http: reqwest::Client, base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Current access token, fetched with client credentials when the cached
    /// one is missing or close to expiry.
    pub async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        let response = UpstreamError::check(SERVICE, response).await?;
        let token: TokenResponse = decode(response).await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in = token.expires_in, "paypal access token refreshed");

        Ok(token.access_token)
    }

    /// Create a CAPTURE-intent order for `amount_cents` in `currency`.
    ///
    /// `reference` is our order id and comes back on capture.
    pub async fn create_order(
        &self,
        reference: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Result<CreatedOrder, UpstreamError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference,
                "amount": {
                    "currency_code": currency,
                    "value": format_amount(amount_cents),
                }
            }]
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("create-{reference}"))
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        let response = UpstreamError::check(SERVICE, response).await?;
        let order: OrderResponse = decode(response).await?;

        let approve_url = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href);

        Ok(CreatedOrder {
            id: order.id,
            status: order.status,
            approve_url,
        })
    }

    /// Capture an order the buyer has approved.
    ///
    /// PayPal answers a second capture with `422 ORDER_ALREADY_CAPTURED`; the
    /// order is then read back and reported with its current status.
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<CapturedOrder, UpstreamError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, paypal_order_id
            ))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{paypal_order_id}"))
            .json(&json!({}))
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;

        let response = match UpstreamError::check(SERVICE, response).await {
            Ok(response) => response,
            Err(err) if is_already_captured(&err) => {
                tracing::info!(paypal_order_id, "paypal order already captured");
                return self.get_order(paypal_order_id).await;
            }
            Err(err) => return Err(err),
        };
        let capture: CaptureResponse = decode(response).await?;

        Ok(capture.into())
    }

    /// Current state of a PayPal order.
    pub async fn get_order(&self, paypal_order_id: &str) -> Result<CapturedOrder, UpstreamError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, paypal_order_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        let response = UpstreamError::check(SERVICE, response).await?;
        let order: CaptureResponse = decode(response).await?;

        Ok(order.into())
    }
}

impl From<CaptureResponse> for CapturedOrder {
    fn from(capture: CaptureResponse) -> Self {
        let capture_id = capture
            .purchase_units
            .into_iter()
            .filter_map(|u| u.payments)
            .flat_map(|p| p.captures)
            .map(|c| c.id)
            .next();

        CapturedOrder {
            id: capture.id,
            status: capture.status,
            capture_id,
        }
    }
}

fn is_already_captured(err: &UpstreamError) -> bool {
    matches!(
        err,
        UpstreamError::Status { status: 422, body, .. } if body.contains("ORDER_ALREADY_CAPTURED")
    )
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    response.json::<T>().await.map_err(|e| UpstreamError::Decode {
        service: SERVICE,
        message: e.to_string(),
    })
}

/// Render cents as PayPal's decimal string, e.g. `1234` → `"12.34"`.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PayPalClient {
        PayPalClient::new(reqwest::Client::new(), &server.uri(), "cid", "csecret")
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A21AA-token",
                "token_type": "Bearer",
                "expires_in": 32400
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn amounts_are_rendered_with_two_decimals() {
        assert_eq!(format_amount(1234), "12.34");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(1000), "10.00");
        assert_eq!(format_amount(0), "0.00");
    }

    #[tokio::test]
    async fn token_is_cached_between_calls() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        let client = client(&server);
        assert_eq!(client.access_token().await.unwrap(), "A21AA-token");
        assert_eq!(client.access_token().await.unwrap(), "A21AA-token");
    }

    #[tokio::test]
    async fn create_order_returns_approve_link() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .and(header("authorization", "Bearer A21AA-token"))
            .and(body_string_contains("\"value\":\"19.99\""))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "5O190127TN364715T",
                "status": "CREATED",
                "links": [
                    {"href": "https://api.paypal.com/v2/checkout/orders/5O190127TN364715T", "rel": "self", "method": "GET"},
                    {"href": "https://www.paypal.com/checkoutnow?token=5O190127TN364715T", "rel": "approve", "method": "GET"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server)
            .create_order("order-1", 1999, "USD")
            .await
            .unwrap();
        assert_eq!(order.id, "5O190127TN364715T");
        assert_eq!(
            order.approve_url.as_deref(),
            Some("https://www.paypal.com/checkoutnow?token=5O190127TN364715T")
        );
    }

    #[tokio::test]
    async fn capture_reports_completion_and_capture_id() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/5O190127TN364715T/capture"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "5O190127TN364715T",
                "status": "COMPLETED",
                "purchase_units": [{
                    "reference_id": "order-1",
                    "payments": {"captures": [{"id": "3C679366HH908993F", "status": "COMPLETED"}]}
                }]
            })))
            .mount(&server)
            .await;

        let captured = client(&server)
            .capture_order("5O190127TN364715T")
            .await
            .unwrap();
        assert!(captured.is_completed());
        assert_eq!(captured.capture_id.as_deref(), Some("3C679366HH908993F"));
    }

    #[tokio::test]
    async fn already_captured_order_is_read_back() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/5O190127TN364715T/capture"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "name": "UNPROCESSABLE_ENTITY",
                "details": [{"issue": "ORDER_ALREADY_CAPTURED"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/5O190127TN364715T"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "5O190127TN364715T",
                "status": "COMPLETED",
                "purchase_units": [{
                    "payments": {"captures": [{"id": "3C679366HH908993F", "status": "COMPLETED"}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let captured = client(&server)
            .capture_order("5O190127TN364715T")
            .await
            .unwrap();
        assert!(captured.is_completed());
        assert_eq!(captured.capture_id.as_deref(), Some("3C679366HH908993F"));
    }

    #[tokio::test]
    async fn capture_error_status_is_upstream_error() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/BAD/capture"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("{\"name\":\"UNPROCESSABLE_ENTITY\"}"),
            )
            .mount(&server)
            .await;

        let err = client(&server).capture_order("BAD").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 422, .. }));
    }
}
