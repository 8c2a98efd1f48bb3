//! Bearer-token authentication and admin authorization middleware.
//!
//! `auth_middleware` intercepts every protected request to:
//! 1. Extract the bearer token from the Authorization header
//! 2. Forward it to the hosted auth service
//! 3. Inject the resolved `AuthUser` into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! `admin_middleware` runs after it on back-office routes and rejects callers
//! whose email is not on the `ADMIN_EMAILS` allow-list with HTTP 403.

use crate::{error::AppError, state::AppState};
use axum::{
    Extension,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authenticated caller attached to the request's extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User id issued by the auth service
    pub id: Uuid,

    /// Email on the account; empty when the provider has none
    pub email: String,
}

/// Emails allowed into the back-office, compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: Vec<String>,
}

impl AdminAllowList {
    /// Parse a comma-separated list. Blank entries are dropped.
    pub fn parse(raw: &str) -> Self {
        let emails = raw
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        !email.is_empty() && self.emails.iter().any(|e| *e == email)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively; an empty token counts as missing.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Bearer authentication middleware.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>`
/// 2. Call the auth service with the token
/// 3. If it resolves to a user: inject `AuthUser`, call next handler
/// 4. Otherwise: return 401 Unauthorized
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(request.headers()).ok_or(AppError::Unauthorized)?;

    let remote = state
        .auth
        .get_user(token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let user = AuthUser {
        id: remote.id,
        email: remote.email.unwrap_or_default(),
    };

    tracing::debug!(user_id = %user.id, "request authenticated");

    // Route handlers can now extract this using Extension<AuthUser>
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Allow-list check for back-office routes. Must run after `auth_middleware`.
pub async fn admin_middleware(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.admins.contains(&user.email) {
        tracing::warn!(user_id = %user.id, "admin route refused");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
