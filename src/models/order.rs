//! Order, inventory and subscription models.
//!
//! An order moves through a small lifecycle:
//!
//! ```text
//! pending ──► approved ──► paid
//!    │           │
//!    ├──► paid   └──► rejected
//!    └──► rejected
//! ```
//!
//! `paid` and `rejected` are terminal. A subscription credential is bound to
//! an order only once it is approved or paid, by the database procedures.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::Paid,
        OrderStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Paid => "paid",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Paid)
                | (Pending, Rejected)
                | (Approved, Paid)
                | (Approved, Rejected)
        )
    }

    /// Statuses from which `self` may be entered.
    pub fn allowed_sources(self) -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(self))
            .map(OrderStatus::as_str)
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "approved" => Ok(OrderStatus::Approved),
            "paid" => Ok(OrderStatus::Paid),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(AppError::InvalidRequest(format!("حالة طلب غير معروفة: {other}"))),
        }
    }
}

/// Represents an order record from the database.
///
/// # Amounts
///
/// `amount_cents` is the product price at order time; `discount_cents` is the
/// promo-code discount. The customer pays `amount_cents - discount_cents`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_email: String,
    pub product_id: Uuid,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub currency: String,
    /// One of `pending`, `approved`, `paid`, `rejected`
    pub status: String,
    /// One of `paypal`, `manual`, `trial`
    pub payment_method: String,
    pub paypal_order_id: Option<String>,
    pub promo_code: Option<String>,
    pub commissioner_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, AppError> {
        self.status.parse()
    }

    /// What the customer is charged.
    pub fn payable_cents(&self) -> i64 {
        self.amount_cents - self.discount_cents
    }

    /// False for free products and full-discount promo codes; such orders
    /// settle without PayPal.
    pub fn requires_payment(&self) -> bool {
        self.payable_cents() > 0
    }
}

/// A credential bound to an order.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub inventory_id: Uuid,
    pub credential: String,
    /// `active` or `expired`
    pub status: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pre-provisioned credential in the shared pool.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub credential: String,
    /// `available`, `assigned` or `retired`
    pub status: String,
    pub order_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request body for placing an order.
///
/// ```json
/// { "product_id": "550e8400-e29b-41d4-a716-446655440000", "promo_code": "SARA10" }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: Uuid,
    pub promo_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectOrderRequest {
    pub reason: Option<String>,
}

/// Query string for the admin order listing.
#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

/// Request body for adding credentials to the pool.
///
/// ```json
/// { "product_id": "550e8400-...", "credentials": ["user1:pass1", "user2:pass2"] }
/// ```
#[derive(Debug, Deserialize)]
pub struct AddInventoryRequest {
    pub product_id: Uuid,
    pub credentials: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryFilter {
    pub product_id: Option<Uuid>,
    pub status: Option<String>,
}

/// Body of both PayPal checkout calls.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub order_id: Uuid,
}

/// PayPal order waiting for the buyer; the client redirects to `approve_url`.
///
/// When nothing is owed there is no PayPal order and `fulfillment` carries
/// the settled order instead.
#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub paypal_order_id: Option<String>,
    pub approve_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<FulfillmentResponse>,
}

/// Result of an approval or payment: the order and, when inventory allowed,
/// its subscription.
#[derive(Debug, Serialize)]
pub struct FulfillmentResponse {
    pub order: Order,
    pub subscription: Option<Subscription>,
    /// Arabic note for the caller when no subscription could be bound yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body for admin order listings with the product name joined in.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderWithProduct {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub product_name: String,
}
