//! Trial code handlers.
//!
//! - POST /api/trial/redeem - Customer redeems a code
//! - GET /api/admin/trial-codes - Back-office listing
//! - POST /api/admin/trial-codes - Generate a batch of codes

use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        order::{Order, Subscription},
        trial::{GenerateTrialCodesRequest, RedeemTrialRequest, TrialCode, generate_code},
    },
    services::order_service,
    state::AppState,
};

/// Attempts per code before a batch gives up on collisions.
const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub order: Order,
    pub subscription: Subscription,
}

/// Redeem a trial code.
///
/// # Request Body
///
/// ```json
/// { "code": "k7q2m9x4pa" }
/// ```
///
/// Codes are case-insensitive.
///
/// # Response
///
/// - **200**: the zero-amount trial order and its subscription
/// - **400**: code expired, used up, or already redeemed by the caller
/// - **404**: unknown code
/// - **409** `no_inventory`: pool empty; the code is not spent
pub async fn redeem(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RedeemTrialRequest>,
) -> Result<Json<RedeemResponse>, AppError> {
    let (order, subscription) =
        order_service::redeem_trial(&state.pool, &user, &request.code, Utc::now()).await?;

    order_service::notify_subscription_ready(&state.pool, &state.mailer, &order, &subscription)
        .await;

    Ok(Json(RedeemResponse {
        order,
        subscription,
    }))
}

pub async fn list_codes(State(pool): State<DbPool>) -> Result<Json<Vec<TrialCode>>, AppError> {
    let codes =
        sqlx::query_as::<_, TrialCode>("SELECT * FROM trial_codes ORDER BY created_at DESC LIMIT 1000")
            .fetch_all(&pool)
            .await?;

    Ok(Json(codes))
}

/// Generate a batch of trial codes for one product.
///
/// # Request Body
///
/// ```json
/// {
///   "product_id": "...",
///   "count": 20,
///   "duration_days": 3,
///   "max_uses": 1,
///   "expires_at": "2026-12-31T23:59:59Z"
/// }
/// ```
///
/// - **201 Created**: the new codes
/// - **400**: count outside 1..=500, non-positive duration or uses
/// - **404**: product missing
pub async fn generate_codes(
    State(pool): State<DbPool>,
    Json(request): Json<GenerateTrialCodesRequest>,
) -> Result<(StatusCode, Json<Vec<TrialCode>>), AppError> {
    request.validate()?;

    let product_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(request.product_id)
            .fetch_one(&pool)
            .await?;
    if !product_exists {
        return Err(AppError::NotFound("المنتج غير موجود"));
    }

    let mut tx = pool.begin().await?;
    let mut codes = Vec::with_capacity(request.count as usize);

    for _ in 0..request.count {
        let mut inserted = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            inserted = sqlx::query_as::<_, TrialCode>(
                r#"
                INSERT INTO trial_codes (code, product_id, duration_days, max_uses, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (code) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(generate_code())
            .bind(request.product_id)
            .bind(request.duration_days)
            .bind(request.max_uses)
            .bind(request.expires_at)
            .fetch_optional(&mut *tx)
            .await?;

            if inserted.is_some() {
                break;
            }
        }

        let code = inserted.ok_or_else(|| {
            AppError::Conflict("تعذر توليد أكواد فريدة، حاول مرة أخرى".to_string())
        })?;
        codes.push(code);
    }

    tx.commit().await?;

    tracing::info!(product_id = %request.product_id, count = codes.len(), "trial codes generated");
    Ok((StatusCode::CREATED, Json(codes)))
}
