//! Order service - order lifecycle and subscription assignment.
//!
//! This service handles:
//! - Order placement with promo-code discounts
//! - Status transitions as conditional updates
//! - Calls into the inventory assignment procedures
//! - Commission bookkeeping for paid orders and customer notification
//! - Expiry of stale orders and lapsed subscriptions
//!
//! # Exclusivity
//!
//! Binding a credential to an order happens inside the database procedures
//! (`assign_subscription_to_order`, `auto_create_subscription_from_order`,
//! `refresh_subscription_from_inventory`), which lock the order row and skip
//! inventory rows locked by concurrent callers. This module only calls them
//! and maps their error tokens.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        catalog::Product,
        commissioner::{Commissioner, normalize_code},
        order::{CreateOrderRequest, FulfillmentResponse, Order, OrderStatus, Subscription},
        trial::TrialCode,
    },
    services::mailer::{Email, Mailer},
};

/// Shown when payment or approval succeeded but the pool was empty.
pub const PENDING_INVENTORY_MESSAGE: &str =
    "تم تأكيد طلبك وسيتم تفعيل اشتراكك فور توفر المخزون";

/// Which procedure binds the credential.
#[derive(Debug, Clone, Copy)]
pub enum Fulfillment {
    /// `assign_subscription_to_order`: order must already be approved or paid
    Assign,
    /// `auto_create_subscription_from_order`: marks a pending order paid first
    AutoCreate,
}

/// Counts from one expiry sweep.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ExpiryReport {
    pub rejected_orders: u64,
    pub expired_subscriptions: u64,
}

/// Look up an active commissioner by promo code (case-insensitive).
pub async fn find_active_commissioner(
    pool: &DbPool,
    code: &str,
) -> Result<Option<Commissioner>, AppError> {
    let commissioner = sqlx::query_as::<_, Commissioner>(
        "SELECT * FROM commissioners WHERE promo_code = $1 AND is_active = true",
    )
    .bind(normalize_code(code))
    .fetch_optional(pool)
    .await?;

    Ok(commissioner)
}

pub async fn get_active_product(pool: &DbPool, product_id: Uuid) -> Result<Product, AppError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND is_active = true")
        .bind(product_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("المنتج غير موجود"))
}

/// Place a pending order for the caller.
///
/// # Process
///
/// 1. Load the product (must be active)
/// 2. Resolve the promo code, if any, to an active commissioner
/// 3. Insert the order with the price and discount frozen at this moment
///
/// # Errors
///
/// - `NotFound`: product missing or inactive
/// - `InvalidRequest`: unknown promo code, or the account has no email
pub async fn create_order(
    pool: &DbPool,
    user: &AuthUser,
    request: CreateOrderRequest,
) -> Result<(Order, Product), AppError> {
    if user.email.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "لا يوجد بريد إلكتروني مرتبط بالحساب".to_string(),
        ));
    }

    let product = get_active_product(pool, request.product_id).await?;

    let promo = request
        .promo_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let commissioner = match promo {
        Some(code) => Some(
            find_active_commissioner(pool, code)
                .await?
                .ok_or_else(|| AppError::InvalidRequest("كود الخصم غير صالح".to_string()))?,
        ),
        None => None,
    };

    let discount_cents = commissioner
        .as_ref()
        .map_or(0, |c| c.discount_for(product.price_cents));

    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            user_id,
            customer_email,
            product_id,
            amount_cents,
            discount_cents,
            currency,
            promo_code,
            commissioner_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(product.id)
    .bind(product.price_cents)
    .bind(discount_cents)
    .bind(&product.currency)
    .bind(commissioner.as_ref().map(|c| c.promo_code.clone()))
    .bind(commissioner.as_ref().map(|c| c.id))
    .fetch_one(pool)
    .await?;

    tracing::info!(order_id = %order.id, product_id = %product.id, "order placed");

    Ok((order, product))
}

pub async fn get_order(pool: &DbPool, order_id: Uuid) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("الطلب غير موجود"))
}

/// Fetch an order the caller owns. Other users' orders read as missing.
pub async fn get_order_for_user(
    pool: &DbPool,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("الطلب غير موجود"))
}

/// Fetch and lock an order the caller owns until `tx` ends.
pub async fn lock_order_for_user(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("الطلب غير موجود"))
}

/// Move an order to `to`.
///
/// The update only matches rows whose current status may lead to `to`, so of
/// two concurrent callers at most one wins; the other gets a conflict.
///
/// # Errors
///
/// - `NotFound`: no such order
/// - `InvalidTransition`: current status cannot lead to `to`
pub async fn transition(
    pool: &DbPool,
    order_id: Uuid,
    to: OrderStatus,
    reason: Option<&str>,
) -> Result<Order, AppError> {
    let mut tx = pool.begin().await?;
    let order = transition_in(&mut tx, order_id, to, reason).await?;
    tx.commit().await?;

    Ok(order)
}

/// `transition` inside a caller's transaction.
pub async fn transition_in(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    to: OrderStatus,
    reason: Option<&str>,
) -> Result<Order, AppError> {
    let updated = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = $1,
            rejection_reason = COALESCE($2, rejection_reason),
            updated_at = NOW()
        WHERE id = $3 AND status = ANY($4)
        RETURNING *
        "#,
    )
    .bind(to.as_str())
    .bind(reason)
    .bind(order_id)
    .bind(to.allowed_sources())
    .fetch_optional(&mut **tx)
    .await?;

    match updated {
        Some(order) => {
            tracing::info!(order_id = %order_id, status = %to, "order status changed");
            Ok(order)
        }
        None => {
            let current: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(AppError::NotFound("الطلب غير موجود"))?;
            Err(AppError::InvalidTransition {
                from: current,
                to: to.to_string(),
            })
        }
    }
}

/// Bind an available credential to an approved or paid order.
pub async fn assign_subscription(pool: &DbPool, order_id: Uuid) -> Result<Subscription, AppError> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM assign_subscription_to_order($1)")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::from_procedure)
}

/// Mark a pending order paid (if needed) and bind a credential. Returns the
/// existing subscription when one is already bound.
pub async fn auto_create_subscription(
    pool: &DbPool,
    order_id: Uuid,
) -> Result<Subscription, AppError> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM auto_create_subscription_from_order($1)")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::from_procedure)
}

/// Swap a subscription's credential for a fresh one from the pool. The old
/// credential is retired.
pub async fn refresh_subscription(
    pool: &DbPool,
    subscription_id: Uuid,
) -> Result<Subscription, AppError> {
    let subscription = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM refresh_subscription_from_inventory($1)",
    )
    .bind(subscription_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_procedure)?;

    tracing::info!(subscription_id = %subscription_id, "subscription credential refreshed");
    Ok(subscription)
}

/// Bind a credential, book the commission and notify the customer.
///
/// An empty pool is not an error here: the order keeps its approved/paid
/// status and the response says the subscription will follow. The customer
/// is emailed only when this call bound the credential.
pub async fn fulfill(
    pool: &DbPool,
    mailer: &Mailer,
    order_id: Uuid,
    mode: Fulfillment,
) -> Result<FulfillmentResponse, AppError> {
    let (subscription, newly_bound) = match find_subscription_for_order(pool, order_id).await? {
        Some(existing) => (Some(existing), false),
        None => {
            let result = match mode {
                Fulfillment::Assign => assign_subscription(pool, order_id).await,
                Fulfillment::AutoCreate => auto_create_subscription(pool, order_id).await,
            };

            match result {
                Ok(subscription) => (Some(subscription), true),
                Err(AppError::NoInventory) => {
                    tracing::warn!(order_id = %order_id, "no inventory for order, subscription deferred");
                    (None, false)
                }
                Err(AppError::AlreadyAssigned) => {
                    (find_subscription_for_order(pool, order_id).await?, false)
                }
                Err(e) => return Err(e),
            }
        }
    };

    let order = get_order(pool, order_id).await?;
    record_commission(pool, &order).await;

    let message = match &subscription {
        Some(subscription) => {
            if newly_bound {
                notify_subscription_ready(pool, mailer, &order, subscription).await;
            }
            None
        }
        None => Some(PENDING_INVENTORY_MESSAGE.to_string()),
    };

    Ok(FulfillmentResponse {
        order,
        subscription,
        message,
    })
}

pub async fn find_subscription_for_order(
    pool: &DbPool,
    order_id: Uuid,
) -> Result<Option<Subscription>, AppError> {
    let subscription =
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

    Ok(subscription)
}

/// Email the customer their credential. Failures are logged only.
pub async fn notify_subscription_ready(
    pool: &DbPool,
    mailer: &Mailer,
    order: &Order,
    subscription: &Subscription,
) {
    let product_name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = $1")
        .bind(order.product_id)
        .fetch_optional(pool)
        .await;

    let product_name = match product_name {
        Ok(Some(name)) => name,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::error!(order_id = %order.id, error = %e, "product lookup for email failed");
            String::new()
        }
    };

    let email = Email::subscription_ready(
        &order.customer_email,
        &product_name,
        &subscription.credential,
        &subscription.expires_at.format("%Y-%m-%d").to_string(),
    );
    mailer.send_logged(email).await;
}

/// Book the commission for a paid order placed with a promo code.
///
/// Approved-only orders earn nothing. At most one commission row exists per order;
/// the commissioner's usage count moves only when the row is new. Failures
/// are logged and never fail the caller.
pub async fn record_commission(pool: &DbPool, order: &Order) {
    let Some(commissioner_id) = order.commissioner_id else {
        return;
    };
    if order.status != OrderStatus::Paid.as_str() {
        return;
    }

    if let Err(e) = try_record_commission(pool, order, commissioner_id).await {
        tracing::error!(order_id = %order.id, error = %e, "commission bookkeeping failed");
    }
}

async fn try_record_commission(
    pool: &DbPool,
    order: &Order,
    commissioner_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let commissioner =
        sqlx::query_as::<_, Commissioner>("SELECT * FROM commissioners WHERE id = $1 FOR UPDATE")
            .bind(commissioner_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("المسوّق غير موجود"))?;

    let amount_cents = commissioner.commission_for(order.payable_cents());

    let inserted = sqlx::query(
        r#"
        INSERT INTO commissions (commissioner_id, order_id, amount_cents)
        VALUES ($1, $2, $3)
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(commissioner_id)
    .bind(order.id)
    .bind(amount_cents)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 1 {
        sqlx::query("UPDATE commissioners SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(commissioner_id)
            .execute(&mut *tx)
            .await?;
        tracing::info!(order_id = %order.id, amount_cents, "commission recorded");
    }

    tx.commit().await?;
    Ok(())
}

/// Cutoff before which pending orders count as abandoned.
pub fn stale_cutoff(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(ttl_hours.max(1))
}

/// Reject abandoned pending orders and expire lapsed subscriptions.
pub async fn expire_stale(
    pool: &DbPool,
    now: DateTime<Utc>,
    pending_ttl_hours: i64,
) -> Result<ExpiryReport, AppError> {
    let rejected_orders = sqlx::query(
        r#"
        UPDATE orders
        SET status = 'rejected', rejection_reason = 'expired', updated_at = NOW()
        WHERE status = 'pending' AND created_at < $1
        "#,
    )
    .bind(stale_cutoff(now, pending_ttl_hours))
    .execute(pool)
    .await?
    .rows_affected();

    let expired_subscriptions = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'expired', updated_at = NOW()
        WHERE status = 'active' AND expires_at <= $1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    let report = ExpiryReport {
        rejected_orders,
        expired_subscriptions,
    };
    tracing::info!(?report, "expiry sweep finished");
    Ok(report)
}

/// Redeem a trial code for the caller.
///
/// # Process
///
/// 1. Lock the code and check expiry and remaining uses
/// 2. Record the redemption (one per user per code)
/// 3. Spend one use
/// 4. Create a zero-amount trial order and bind a credential for the
///    code's duration
///
/// Everything runs in one transaction: an empty pool leaves the code unspent.
pub async fn redeem_trial(
    pool: &DbPool,
    user: &AuthUser,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(Order, Subscription), AppError> {
    let mut tx = pool.begin().await?;

    let trial = sqlx::query_as::<_, TrialCode>(
        "SELECT * FROM trial_codes WHERE code = $1 FOR UPDATE",
    )
    .bind(normalize_code(code))
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("كود التجربة غير موجود"))?;

    if let Some(reason) = trial.unusable_reason(now) {
        tx.rollback().await?;
        return Err(AppError::InvalidRequest(reason.to_string()));
    }

    let redemption_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO trial_redemptions (trial_code_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (trial_code_id, user_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(trial.id)
    .bind(user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(redemption_id) = redemption_id else {
        tx.rollback().await?;
        return Err(AppError::InvalidRequest(
            "لقد استخدمت هذا الكود مسبقاً".to_string(),
        ));
    };

    let spent = sqlx::query(
        "UPDATE trial_codes SET used_count = used_count + 1 WHERE id = $1 AND used_count < max_uses",
    )
    .bind(trial.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if spent == 0 {
        tx.rollback().await?;
        return Err(AppError::InvalidRequest(
            "تم استخدام كود التجربة بالكامل".to_string(),
        ));
    }

    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (user_id, customer_email, product_id, amount_cents, currency, payment_method)
        SELECT $1, $2, p.id, 0, p.currency, 'trial'
        FROM products p
        WHERE p.id = $3
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(trial.product_id)
    .fetch_one(&mut *tx)
    .await?;

    let subscription = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM auto_create_subscription_from_order($1, $2)",
    )
    .bind(order.id)
    .bind(trial.duration_days)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_procedure)?;

    sqlx::query("UPDATE trial_redemptions SET order_id = $1 WHERE id = $2")
        .bind(order.id)
        .bind(redemption_id)
        .execute(&mut *tx)
        .await?;

    // Re-read: the procedure moved the order to paid
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order.id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(order_id = %order.id, trial_code_id = %trial.id, "trial redeemed");
    Ok((order, subscription))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stale_cutoff_subtracts_ttl() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(
            stale_cutoff(now, 48),
            Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn stale_cutoff_never_reaches_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(stale_cutoff(now, 0), now - Duration::hours(1));
    }
}
