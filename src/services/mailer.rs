//! Transactional email through a signed HTTP mail relay.
//!
//! Each email is POSTed as JSON to `MAIL_WEBHOOK_URL` with an HMAC-SHA256
//! signature of the body, so the relay can reject forged sends.
//!
//! # Headers Sent
//!
//! - `Content-Type: application/json`
//! - `X-Mail-Signature: sha256=<hex>`
//! - `X-Mail-Id: <uuid>`

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use super::UpstreamError;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "mail";

/// A rendered email.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn order_received(to: &str, product: &str, order_id: Uuid) -> Self {
        Self {
            to: to.to_string(),
            subject: "تم استلام طلبك".to_string(),
            body: format!(
                "شكراً لك! تم استلام طلبك لـ {product}.\nرقم الطلب: {order_id}\nسنقوم بإعلامك فور تفعيل الاشتراك."
            ),
        }
    }

    pub fn subscription_ready(to: &str, product: &str, credential: &str, expires_on: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "اشتراكك جاهز".to_string(),
            body: format!(
                "تم تفعيل اشتراكك في {product}.\nبيانات الدخول: {credential}\nينتهي الاشتراك في: {expires_on}"
            ),
        }
    }

    pub fn order_rejected(to: &str, order_id: Uuid, reason: Option<&str>) -> Self {
        let reason = reason.unwrap_or("لم يتم تحديد سبب");
        Self {
            to: to.to_string(),
            subject: "تم رفض طلبك".to_string(),
            body: format!("نأسف، تم رفض الطلب رقم {order_id}.\nالسبب: {reason}"),
        }
    }

    pub fn ticket_reply(to: &str, subject: &str, reply: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("رد على تذكرتك: {subject}"),
            body: reply.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    id: Uuid,
    #[serde(flatten)]
    email: &'a Email,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    http: reqwest::Client,
    relay: Option<Relay>,
}

#[derive(Debug, Clone)]
struct Relay {
    url: String,
    secret: String,
}

impl Mailer {
    /// A mailer without a URL logs and drops every email.
    pub fn new(http: reqwest::Client, url: Option<&str>, secret: Option<&str>) -> Self {
        let relay = url.map(|url| Relay {
            url: url.to_string(),
            secret: secret.unwrap_or_default().to_string(),
        });
        if relay.is_none() {
            tracing::warn!("MAIL_WEBHOOK_URL not set, outbound email disabled");
        }
        Self { http, relay }
    }

    pub async fn send(&self, email: &Email) -> Result<(), UpstreamError> {
        let Some(relay) = &self.relay else {
            tracing::info!(to = %email.to, subject = %email.subject, "email skipped, no relay configured");
            return Ok(());
        };

        let id = Uuid::new_v4();
        let payload = serde_json::to_string(&MailPayload { id, email }).map_err(|e| {
            UpstreamError::Decode {
                service: SERVICE,
                message: e.to_string(),
            }
        })?;
        let signature = sign(&relay.secret, &payload);

        let response = self
            .http
            .post(&relay.url)
            .header("Content-Type", "application/json")
            .header("X-Mail-Signature", signature)
            .header("X-Mail-Id", id.to_string())
            .body(payload)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        UpstreamError::check(SERVICE, response).await?;

        tracing::info!(mail_id = %id, to = %email.to, "email sent");
        Ok(())
    }

    /// Send and log failures. The caller's request never fails on email.
    pub async fn send_logged(&self, email: Email) {
        if let Err(e) = self.send(&email).await {
            tracing::error!(to = %email.to, subject = %email.subject, error = %e, "email delivery failed");
        }
    }
}

/// `sha256=<hex HMAC-SHA256(secret, payload)>`
fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
