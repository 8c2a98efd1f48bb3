//! PayPal checkout handlers.
//!
//! - POST /api/checkout/paypal/create - Open a PayPal order for a pending order
//! - POST /api/checkout/paypal/capture - Capture after buyer approval and fulfill

use axum::{Extension, Json, extract::State};

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::order::{CheckoutRequest, CheckoutSession, FulfillmentResponse, Order, OrderStatus},
    services::order_service::{self, Fulfillment},
    state::AppState,
};

/// Open a PayPal order for one of the caller's pending orders.
///
/// # Request Body
///
/// ```json
/// { "order_id": "550e8400-..." }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "order_id": "550e8400-...",
///   "paypal_order_id": "5O190127TN364715T",
///   "approve_url": "https://www.sandbox.paypal.com/checkoutnow?token=..."
/// }
/// ```
///
/// An order with nothing to pay (free product, 100% promo code) is marked
/// paid right away: `paypal_order_id` is `null` and `fulfillment` holds the
/// order and its subscription.
///
/// - **404**: not the caller's order
/// - **409**: order is no longer pending
/// - **502**: PayPal unreachable or refused
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    let order = order_service::get_order_for_user(&state.pool, request.order_id, user.id).await?;

    let status = order.status()?;
    if status != OrderStatus::Pending {
        return Err(AppError::InvalidTransition {
            from: status.to_string(),
            to: OrderStatus::Paid.to_string(),
        });
    }

    if !order.requires_payment() {
        tracing::info!(order_id = %order.id, "nothing to pay, settling without paypal");
        // Paid before binding, so an empty pool still leaves it paid
        order_service::transition(&state.pool, order.id, OrderStatus::Paid, None).await?;
        let fulfillment =
            order_service::fulfill(&state.pool, &state.mailer, order.id, Fulfillment::AutoCreate)
                .await?;
        return Ok(Json(CheckoutSession {
            order_id: order.id,
            paypal_order_id: None,
            approve_url: None,
            fulfillment: Some(fulfillment),
        }));
    }

    let created = state
        .paypal
        .create_order(&order.id.to_string(), order.payable_cents(), &order.currency)
        .await?;

    sqlx::query(
        "UPDATE orders SET paypal_order_id = $1, payment_method = 'paypal', updated_at = NOW() WHERE id = $2",
    )
    .bind(&created.id)
    .bind(order.id)
    .execute(&state.pool)
    .await?;

    tracing::info!(
        order_id = %order.id,
        paypal_order_id = %created.id,
        paypal_status = %created.status,
        "paypal order created"
    );

    Ok(Json(CheckoutSession {
        order_id: order.id,
        paypal_order_id: Some(created.id),
        approve_url: created.approve_url,
        fulfillment: None,
    }))
}

/// Capture the PayPal payment and activate the subscription.
///
/// Calling this again for a paid order returns the current state without
/// contacting PayPal. A rejected order is refused before PayPal is called.
///
/// # Response (200)
///
/// ```json
/// {
///   "order": { "status": "paid", ... },
///   "subscription": { "credential": "...", "expires_at": "..." }
/// }
/// ```
///
/// With an empty pool `subscription` is `null` and `message` says the
/// subscription will be activated once stock arrives.
///
/// - **400**: no PayPal order yet, or PayPal did not complete the capture
/// - **404**: not the caller's order
/// - **409**: order was rejected
pub async fn capture_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<FulfillmentResponse>, AppError> {
    // Row lock held across the PayPal call; other writers to this order wait
    // for the commit.
    let mut tx = state.pool.begin().await?;
    let order = order_service::lock_order_for_user(&mut tx, request.order_id, user.id).await?;

    let status = order.status()?;
    if status == OrderStatus::Paid {
        tx.rollback().await?;
        return already_paid(&state, order).await.map(Json);
    }
    if status.is_terminal() {
        return Err(AppError::InvalidTransition {
            from: status.to_string(),
            to: OrderStatus::Paid.to_string(),
        });
    }

    let paypal_order_id = order.paypal_order_id.as_deref().ok_or_else(|| {
        AppError::InvalidRequest("لم يتم إنشاء عملية دفع لهذا الطلب".to_string())
    })?;

    let captured = state.paypal.capture_order(paypal_order_id).await?;
    if !captured.is_completed() {
        tracing::warn!(
            order_id = %order.id,
            paypal_status = %captured.status,
            "paypal capture not completed"
        );
        return Err(AppError::InvalidRequest("لم تكتمل عملية الدفع".to_string()));
    }

    tracing::info!(
        order_id = %order.id,
        capture_id = captured.capture_id.as_deref().unwrap_or_default(),
        "payment captured"
    );

    order_service::transition_in(&mut tx, order.id, OrderStatus::Paid, None).await?;
    tx.commit().await?;

    let response =
        order_service::fulfill(&state.pool, &state.mailer, order.id, Fulfillment::AutoCreate)
            .await?;

    Ok(Json(response))
}

async fn already_paid(state: &AppState, order: Order) -> Result<FulfillmentResponse, AppError> {
    let subscription = order_service::find_subscription_for_order(&state.pool, order.id).await?;
    let message = subscription
        .is_none()
        .then(|| order_service::PENDING_INVENTORY_MESSAGE.to_string());

    Ok(FulfillmentResponse {
        order,
        subscription,
        message,
    })
}
