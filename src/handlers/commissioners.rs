//! Promo code and commissioner handlers.
//!
//! Public:
//! - POST /api/promo/validate - Price preview for a promo code
//!
//! Admin:
//! - GET/POST /api/admin/commissioners
//! - PUT /api/admin/commissioners/{id}
//! - GET /api/admin/commissioners/{id}/earnings
//! - POST /api/admin/commissioners/{id}/payout

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::commissioner::{
        Commissioner, CommissionerRequest, Earnings, EarningsResponse, PromoPreview,
        ValidatePromoRequest,
    },
    services::order_service,
};

const DUPLICATE_CODE: &str = "كود الخصم مستخدم من قبل مسوّق آخر";

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub commissions: u64,
    pub amount_cents: i64,
}

/// Preview the price of a product with a promo code.
///
/// # Request Body
///
/// ```json
/// { "code": "sara10", "product_id": "..." }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "code": "SARA10",
///   "discount_percent": 10,
///   "price_cents": 2000,
///   "discount_cents": 200,
///   "total_cents": 1800
/// }
/// ```
///
/// - **400**: unknown or inactive code
/// - **404**: product missing or inactive
pub async fn validate_promo(
    State(pool): State<DbPool>,
    Json(request): Json<ValidatePromoRequest>,
) -> Result<Json<PromoPreview>, AppError> {
    let product = order_service::get_active_product(&pool, request.product_id).await?;
    let commissioner = order_service::find_active_commissioner(&pool, &request.code)
        .await?
        .ok_or_else(|| AppError::InvalidRequest("كود الخصم غير صالح".to_string()))?;

    let discount_cents = commissioner.discount_for(product.price_cents);

    Ok(Json(PromoPreview {
        code: commissioner.promo_code,
        discount_percent: commissioner.discount_percent,
        price_cents: product.price_cents,
        discount_cents,
        total_cents: product.price_cents - discount_cents,
    }))
}

pub async fn list_commissioners(
    State(pool): State<DbPool>,
) -> Result<Json<Vec<Commissioner>>, AppError> {
    let commissioners =
        sqlx::query_as::<_, Commissioner>("SELECT * FROM commissioners ORDER BY created_at DESC")
            .fetch_all(&pool)
            .await?;

    Ok(Json(commissioners))
}

/// Register a commissioner. The promo code is stored upper-case.
///
/// - **201 Created**: the commissioner
/// - **400**: invalid rate, discount, email or code
/// - **409**: promo code taken
pub async fn create_commissioner(
    State(pool): State<DbPool>,
    Json(request): Json<CommissionerRequest>,
) -> Result<(StatusCode, Json<Commissioner>), AppError> {
    request.validate()?;

    let commissioner = sqlx::query_as::<_, Commissioner>(
        r#"
        INSERT INTO commissioners (name, email, promo_code, commission_rate_bp, discount_percent, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(request.email.trim())
    .bind(request.normalized_code())
    .bind(request.commission_rate_bp)
    .bind(request.discount_percent)
    .bind(request.is_active)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_violation(e, DUPLICATE_CODE))?;

    tracing::info!(
        commissioner_id = %commissioner.id,
        code = %commissioner.promo_code,
        "commissioner created"
    );
    Ok((StatusCode::CREATED, Json(commissioner)))
}

pub async fn update_commissioner(
    State(pool): State<DbPool>,
    Path(commissioner_id): Path<Uuid>,
    Json(request): Json<CommissionerRequest>,
) -> Result<Json<Commissioner>, AppError> {
    request.validate()?;

    let commissioner = sqlx::query_as::<_, Commissioner>(
        r#"
        UPDATE commissioners
        SET name = $1, email = $2, promo_code = $3, commission_rate_bp = $4,
            discount_percent = $5, is_active = $6
        WHERE id = $7
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(request.email.trim())
    .bind(request.normalized_code())
    .bind(request.commission_rate_bp)
    .bind(request.discount_percent)
    .bind(request.is_active)
    .bind(commissioner_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| AppError::unique_violation(e, DUPLICATE_CODE))?
    .ok_or(AppError::NotFound("المسوّق غير موجود"))?;

    Ok(Json(commissioner))
}

/// Commission totals for one commissioner.
///
/// # Response (200)
///
/// ```json
/// {
///   "commissioner": { "id": "...", "promo_code": "SARA10", ... },
///   "orders": 12,
///   "unpaid_cents": 1500,
///   "paid_out_cents": 4200
/// }
/// ```
pub async fn get_earnings(
    State(pool): State<DbPool>,
    Path(commissioner_id): Path<Uuid>,
) -> Result<Json<EarningsResponse>, AppError> {
    let commissioner = get_commissioner(&pool, commissioner_id).await?;

    let earnings = sqlx::query_as::<_, Earnings>(
        r#"
        SELECT
            COUNT(*) AS orders,
            COALESCE(SUM(amount_cents) FILTER (WHERE NOT paid_out), 0)::BIGINT AS unpaid_cents,
            COALESCE(SUM(amount_cents) FILTER (WHERE paid_out), 0)::BIGINT AS paid_out_cents
        FROM commissions
        WHERE commissioner_id = $1
        "#,
    )
    .bind(commissioner_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(EarningsResponse {
        commissioner,
        earnings,
    }))
}

/// Mark every unpaid commission of a commissioner as paid out.
pub async fn payout(
    State(pool): State<DbPool>,
    Path(commissioner_id): Path<Uuid>,
) -> Result<Json<PayoutResponse>, AppError> {
    get_commissioner(&pool, commissioner_id).await?;

    let paid: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE commissions
        SET paid_out = true, paid_out_at = NOW()
        WHERE commissioner_id = $1 AND NOT paid_out
        RETURNING amount_cents
        "#,
    )
    .bind(commissioner_id)
    .fetch_all(&pool)
    .await?;

    let response = PayoutResponse {
        commissions: paid.len() as u64,
        amount_cents: paid.iter().sum(),
    };
    tracing::info!(
        commissioner_id = %commissioner_id,
        commissions = response.commissions,
        amount_cents = response.amount_cents,
        "commissions paid out"
    );

    Ok(Json(response))
}

async fn get_commissioner(pool: &DbPool, commissioner_id: Uuid) -> Result<Commissioner, AppError> {
    sqlx::query_as::<_, Commissioner>("SELECT * FROM commissioners WHERE id = $1")
        .bind(commissioner_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("المسوّق غير موجود"))
}
