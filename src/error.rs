//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//! Client-facing messages are Arabic; log output keeps the English `Display`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::UpstreamError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing/invalid bearer token, caller not on the admin allow-list
/// - **Resource Errors**: Requested resources not found
/// - **Lifecycle Errors**: Order transitions and inventory assignment conflicts
/// - **Validation Errors**: Invalid request data
/// - **Upstream Errors**: Auth service, PayPal or TMDB failed
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer token is missing or rejected by the auth service.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated caller is not allowed to use this route.
    #[error("Forbidden")]
    Forbidden,

    /// Requested resource does not exist or is not visible to the caller.
    ///
    /// The string is the Arabic message returned to the client.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request collides with an existing row (duplicate slug, promo code...).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Order cannot move from its current status to the requested one.
    #[error("Invalid order transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The inventory pool has no available credential for the product.
    #[error("No inventory available")]
    NoInventory,

    /// The order already has a subscription bound to it.
    #[error("Subscription already assigned")]
    AlreadyAssigned,

    /// Assignment attempted on an order that is neither approved nor paid.
    #[error("Order not approved")]
    OrderNotApproved,

    /// Per-client request budget exhausted.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A remote dependency failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl AppError {
    /// Map a stored-procedure failure to a typed error.
    ///
    /// The procedures raise a fixed token as the exception message; anything
    /// else stays a database error.
    pub fn from_procedure(err: sqlx::Error) -> Self {
        let mapped = err
            .as_database_error()
            .and_then(|db| procedure_error(db.message()));

        mapped.unwrap_or(AppError::Database(err))
    }

    /// Map a unique-constraint violation to `Conflict` with `message`.
    pub fn unique_violation(err: sqlx::Error, message: &str) -> Self {
        let duplicate = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());

        if duplicate {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Database(err)
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "غير مصرح: يرجى تسجيل الدخول".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "ليس لديك صلاحية للوصول إلى هذا المورد".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.to_string()),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                format!("لا يمكن تغيير حالة الطلب من {from} إلى {to}"),
            ),
            AppError::NoInventory => (
                StatusCode::CONFLICT,
                "no_inventory",
                "لا يوجد اشتراك متاح في المخزون لهذا المنتج".to_string(),
            ),
            AppError::AlreadyAssigned => (
                StatusCode::CONFLICT,
                "already_assigned",
                "تم تعيين اشتراك لهذا الطلب مسبقاً".to_string(),
            ),
            AppError::OrderNotApproved => (
                StatusCode::CONFLICT,
                "order_not_approved",
                "يجب الموافقة على الطلب أو دفعه قبل تعيين الاشتراك".to_string(),
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "عدد الطلبات كبير جداً، يرجى المحاولة لاحقاً".to_string(),
            ),
            AppError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "تعذر الاتصال بخدمة خارجية، يرجى المحاولة لاحقاً".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "حدث خطأ في الخادم".to_string(),
            ),
        }
    }
}

/// Error token raised by an assignment procedure, if the message carries one.
fn procedure_error(message: &str) -> Option<AppError> {
    if message.contains("NO_INVENTORY") {
        Some(AppError::NoInventory)
    } else if message.contains("ALREADY_ASSIGNED") {
        Some(AppError::AlreadyAssigned)
    } else if message.contains("ORDER_NOT_APPROVED") {
        Some(AppError::OrderNotApproved)
    } else if message.contains("ORDER_NOT_FOUND") {
        Some(AppError::NotFound("الطلب غير موجود"))
    } else if message.contains("SUBSCRIPTION_NOT_FOUND") {
        Some(AppError::NotFound("الاشتراك غير موجود"))
    } else {
        None
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "رسالة الخطأ"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidRequest` → 400
/// - `Unauthorized` → 401
/// - `Forbidden` → 403
/// - `NotFound` → 404
/// - `Conflict`, `InvalidTransition`, `NoInventory`, `AlreadyAssigned`, `OrderNotApproved` → 409
/// - `RateLimited` → 429 with `Retry-After`
/// - `Database` → 500 (details hidden from client)
/// - `Upstream` → 502
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        match &self {
            AppError::Database(e) => tracing::error!(error = %e, "request failed"),
            AppError::Upstream(e) => tracing::error!(error = %e, "upstream call failed"),
            _ => {}
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}
