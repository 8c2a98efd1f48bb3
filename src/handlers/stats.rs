//! Back-office dashboard numbers.
//!
//! - GET /api/admin/stats

use axum::{Json, extract::State};
use serde::Serialize;
use uuid::Uuid;

use crate::{db::DbPool, error::AppError};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct InventoryLevel {
    pub product_id: Uuid,
    pub product_name: String,
    pub available: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Revenue {
    pub currency: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub orders_by_status: Vec<StatusCount>,
    pub revenue: Vec<Revenue>,
    pub inventory: Vec<InventoryLevel>,
    pub open_tickets: i64,
    pub new_leads: i64,
}

/// Dashboard summary.
///
/// Revenue counts approved and paid orders net of discount, per currency.
/// Inventory lists every product with its available credential count,
/// including products at zero.
///
/// # Response (200)
///
/// ```json
/// {
///   "orders_by_status": [{ "status": "paid", "count": 42 }],
///   "revenue": [{ "currency": "USD", "amount_cents": 84000 }],
///   "inventory": [{ "product_id": "...", "product_name": "...", "available": 7 }],
///   "open_tickets": 3,
///   "new_leads": 5
/// }
/// ```
pub async fn dashboard(State(pool): State<DbPool>) -> Result<Json<DashboardStats>, AppError> {
    let orders_by_status = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(&pool)
    .await?;

    let revenue = sqlx::query_as::<_, Revenue>(
        r#"
        SELECT currency, COALESCE(SUM(amount_cents - discount_cents), 0)::BIGINT AS amount_cents
        FROM orders
        WHERE status IN ('approved', 'paid')
        GROUP BY currency
        ORDER BY currency
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let inventory = sqlx::query_as::<_, InventoryLevel>(
        r#"
        SELECT p.id AS product_id, p.name AS product_name,
               COUNT(i.id) FILTER (WHERE i.status = 'available') AS available
        FROM products p
        LEFT JOIN subscription_inventory i ON i.product_id = p.id
        WHERE p.is_active = true
        GROUP BY p.id, p.name
        ORDER BY available, p.name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let open_tickets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status <> 'closed'")
            .fetch_one(&pool)
            .await?;

    let new_leads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE status = 'new'")
        .fetch_one(&pool)
        .await?;

    Ok(Json(DashboardStats {
        orders_by_status,
        revenue,
        inventory,
        open_tickets,
        new_leads,
    }))
}
