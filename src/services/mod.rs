//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, stored-procedure calls and the
//! outbound HTTP integrations (auth service, PayPal, TMDB, mail relay).

pub mod auth_client;
pub mod mailer;
pub mod order_service;
pub mod paypal;
pub mod tmdb;

/// Failure talking to a remote HTTP dependency.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport failure (DNS, connect, timeout).
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("{service} returned an unexpected body: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| UpstreamError::Http { service, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::Status { status: 404, .. })
    }

    /// Turn a non-2xx response into `Status`, keeping the body for the log.
    pub(crate) async fn check(
        service: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, Self> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            service,
            status,
            body,
        })
    }
}

/// Shared `reqwest` client with the configured timeout.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
}
