//! Credential pool handlers (admin).
//!
//! - GET /api/admin/inventory?product_id=&status= - Pool contents
//! - POST /api/admin/inventory - Bulk-add credentials for one product

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    db::DbPool,
    error::AppError,
    models::order::{AddInventoryRequest, InventoryFilter, InventoryItem},
};

const INVENTORY_STATUSES: [&str; 3] = ["available", "assigned", "retired"];

#[derive(Debug, Serialize)]
pub struct AddInventoryResponse {
    pub added: usize,
}

pub async fn list_inventory(
    State(pool): State<DbPool>,
    Query(filter): Query<InventoryFilter>,
) -> Result<Json<Vec<InventoryItem>>, AppError> {
    if let Some(status) = &filter.status {
        if !INVENTORY_STATUSES.contains(&status.as_str()) {
            return Err(AppError::InvalidRequest(format!("حالة غير معروفة: {status}")));
        }
    }

    let items = sqlx::query_as::<_, InventoryItem>(
        r#"
        SELECT * FROM subscription_inventory
        WHERE ($1::uuid IS NULL OR product_id = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT 1000
        "#,
    )
    .bind(filter.product_id)
    .bind(filter.status)
    .fetch_all(&pool)
    .await?;

    Ok(Json(items))
}

/// Add credentials to the pool.
///
/// # Request Body
///
/// ```json
/// { "product_id": "...", "credentials": ["user1:pass1", "user2:pass2"] }
/// ```
///
/// Blank lines are skipped. All rows go in one transaction.
///
/// # Response
///
/// - **201 Created**: `{ "added": 2 }`
/// - **400**: no non-blank credential
/// - **404**: product missing
pub async fn add_inventory(
    State(pool): State<DbPool>,
    Json(request): Json<AddInventoryRequest>,
) -> Result<(StatusCode, Json<AddInventoryResponse>), AppError> {
    let credentials = non_blank(&request.credentials);
    if credentials.is_empty() {
        return Err(AppError::InvalidRequest("لا توجد بيانات اشتراك لإضافتها".to_string()));
    }

    let product_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(request.product_id)
            .fetch_one(&pool)
            .await?;
    if !product_exists {
        return Err(AppError::NotFound("المنتج غير موجود"));
    }

    let mut tx = pool.begin().await?;
    for credential in &credentials {
        sqlx::query("INSERT INTO subscription_inventory (product_id, credential) VALUES ($1, $2)")
            .bind(request.product_id)
            .bind(credential)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!(
        product_id = %request.product_id,
        added = credentials.len(),
        "inventory added"
    );

    Ok((
        StatusCode::CREATED,
        Json(AddInventoryResponse {
            added: credentials.len(),
        }),
    ))
}

fn non_blank(credentials: &[String]) -> Vec<&str> {
    credentials
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect()
}
