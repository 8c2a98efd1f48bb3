//! Scheduled maintenance endpoint.
//!
//! - POST /api/cron/expire - Reject abandoned orders, expire lapsed subscriptions
//!
//! Called by an external scheduler with `Authorization: Bearer <CRON_SECRET>`.

use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::{
    error::AppError,
    middleware::auth::extract_bearer,
    services::order_service::{self, ExpiryReport},
    state::AppState,
};

/// Run one expiry sweep.
///
/// # Response (200)
///
/// ```json
/// { "rejected_orders": 3, "expired_subscriptions": 1 }
/// ```
///
/// - **401**: missing or wrong secret
pub async fn expire(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExpiryReport>, AppError> {
    let presented = extract_bearer(&headers).ok_or(AppError::Unauthorized)?;
    if !secret_matches(presented, &state.config.cron_secret) {
        tracing::warn!("cron call with a wrong secret");
        return Err(AppError::Unauthorized);
    }

    let report = order_service::expire_stale(
        &state.pool,
        Utc::now(),
        state.config.pending_order_ttl_hours,
    )
    .await?;

    Ok(Json(report))
}

/// Compare digests so the comparison time does not depend on where the
/// secrets first differ.
fn secret_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}
