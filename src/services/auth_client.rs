//! Client for the hosted auth service.
//!
//! Bearer tokens are never validated locally; they are forwarded to
//! `GET {AUTH_URL}/auth/v1/user`, which answers with the user the token
//! belongs to or 401.

use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use super::UpstreamError;

const SERVICE: &str = "auth";

/// User record returned by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// Resolve a bearer token to its user.
    ///
    /// Returns `Ok(None)` when the service rejects the token (401/403).
    pub async fn get_user(&self, access_token: &str) -> Result<Option<RemoteUser>, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(access_token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let response = UpstreamError::check(SERVICE, response).await?;
        let user = response
            .json::<RemoteUser>()
            .await
            .map_err(|e| UpstreamError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        Ok(Some(user))
    }
}
