//! Order and subscription HTTP handlers.
//!
//! Customer:
//! - POST /api/orders - Place a pending order
//! - GET /api/orders - Caller's orders
//! - GET /api/orders/{id} - One of the caller's orders
//! - GET /api/subscriptions - Caller's subscriptions
//!
//! Admin:
//! - GET /api/admin/orders?status= - All orders with product names
//! - POST /api/admin/orders/{id}/approve - Approve and bind a credential
//! - POST /api/admin/orders/{id}/reject - Reject with an optional reason
//! - POST /api/admin/orders/{id}/assign - Retry binding a credential
//! - POST /api/admin/subscriptions/{id}/refresh - Swap a subscription's credential

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::order::{
        CreateOrderRequest, FulfillmentResponse, Order, OrderFilter, OrderStatus,
        OrderWithProduct, RejectOrderRequest, Subscription,
    },
    services::{
        mailer::Email,
        order_service::{self, Fulfillment},
    },
    state::AppState,
};

/// Place an order.
///
/// # Request Body
///
/// ```json
/// { "product_id": "550e8400-...", "promo_code": "SARA10" }
/// ```
///
/// # Response
///
/// - **201 Created**: the pending order, with any discount applied
/// - **400**: unknown promo code
/// - **404**: product missing or inactive
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let (order, product) = order_service::create_order(&state.pool, &user, request).await?;

    state
        .mailer
        .send_logged(Email::order_received(&order.customer_email, &product.name, order.id))
        .await;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_my_orders(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(orders))
}

pub async fn get_my_order(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = order_service::get_order_for_user(&pool, order_id, user.id).await?;
    Ok(Json(order))
}

pub async fn list_my_subscriptions(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    let subscriptions = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(subscriptions))
}

/// List orders for the back-office, newest first.
pub async fn admin_list_orders(
    State(pool): State<DbPool>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderWithProduct>>, AppError> {
    let orders = sqlx::query_as::<_, OrderWithProduct>(
        r#"
        SELECT o.*, p.name AS product_name
        FROM orders o
        JOIN products p ON p.id = o.product_id
        WHERE $1::text IS NULL OR o.status = $1
        ORDER BY o.created_at DESC
        LIMIT 500
        "#,
    )
    .bind(filter.status.map(OrderStatus::as_str))
    .fetch_all(&pool)
    .await?;

    Ok(Json(orders))
}

/// Approve a pending order and bind a credential from the pool.
///
/// # Response (200)
///
/// ```json
/// {
///   "order": { "id": "...", "status": "approved", ... },
///   "subscription": { "credential": "...", "expires_at": "..." }
/// }
/// ```
///
/// With an empty pool `subscription` is `null` and `message` says the
/// subscription will follow; retry later with `/assign`.
///
/// - **409**: the order is not pending
pub async fn approve_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentResponse>, AppError> {
    order_service::transition(&state.pool, order_id, OrderStatus::Approved, None).await?;
    let response =
        order_service::fulfill(&state.pool, &state.mailer, order_id, Fulfillment::Assign).await?;

    Ok(Json(response))
}

/// Reject a pending or approved order and tell the customer.
pub async fn reject_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    body: Option<Json<RejectOrderRequest>>,
) -> Result<Json<Order>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let order =
        order_service::transition(&state.pool, order_id, OrderStatus::Rejected, reason).await?;

    state
        .mailer
        .send_logged(Email::order_rejected(&order.customer_email, order.id, reason))
        .await;

    Ok(Json(order))
}

/// Bind a credential to an order that was approved or paid while the pool
/// was empty.
///
/// - **409** `already_assigned`: the order has a subscription
/// - **409** `no_inventory`: the pool is still empty
pub async fn assign_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = order_service::assign_subscription(&state.pool, order_id).await?;
    let order = order_service::get_order(&state.pool, order_id).await?;
    order_service::notify_subscription_ready(&state.pool, &state.mailer, &order, &subscription)
        .await;

    Ok(Json(subscription))
}

/// Replace a subscription's credential with a fresh one from the pool.
pub async fn refresh_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = order_service::refresh_subscription(&state.pool, subscription_id).await?;
    let order = order_service::get_order(&state.pool, subscription.order_id).await?;
    order_service::notify_subscription_ready(&state.pool, &state.mailer, &order, &subscription)
        .await;

    Ok(Json(subscription))
}
