//! Catalog HTTP handlers.
//!
//! Public:
//! - GET /api/categories - Active categories in display order
//! - GET /api/products - Active products, optionally filtered by category slug
//! - GET /api/products/{id} - One active product
//!
//! Admin:
//! - POST /api/admin/categories, PUT/DELETE /api/admin/categories/{id}
//! - POST /api/admin/products, PUT/DELETE /api/admin/products/{id}

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::catalog::{Category, CategoryRequest, Product, ProductFilter, ProductRequest},
    services::order_service,
    state::AppState,
};

const DUPLICATE_SLUG: &str = "المعرّف النصي مستخدم من قبل تصنيف آخر";

/// List active categories.
///
/// # Response (200)
///
/// ```json
/// [{ "id": "...", "name": "بث مباشر", "slug": "streaming", "sort_order": 0, ... }]
/// ```
pub async fn list_categories(State(pool): State<DbPool>) -> Result<Json<Vec<Category>>, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE is_active = true ORDER BY sort_order, name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(categories))
}

/// List active products.
///
/// `?category=<slug>` restricts the listing to one active category.
pub async fn list_products(
    State(pool): State<DbPool>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<Product>>, AppError> {
    let products = match filter.category {
        Some(slug) => {
            sqlx::query_as::<_, Product>(
                r#"
                SELECT p.*
                FROM products p
                JOIN categories c ON c.id = p.category_id
                WHERE p.is_active = true AND c.is_active = true AND c.slug = $1
                ORDER BY p.price_cents
                "#,
            )
            .bind(slug)
            .fetch_all(&pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Product>(
                "SELECT * FROM products WHERE is_active = true ORDER BY created_at DESC",
            )
            .fetch_all(&pool)
            .await?
        }
    };

    Ok(Json(products))
}

pub async fn get_product(
    State(pool): State<DbPool>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = order_service::get_active_product(&pool, product_id).await?;
    Ok(Json(product))
}

/// Create a category.
///
/// # Response
///
/// - **201 Created**: the category
/// - **400**: empty name or malformed slug
/// - **409**: slug already taken
pub async fn create_category(
    State(pool): State<DbPool>,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    request.validate()?;

    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, slug, description, sort_order, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(&request.slug)
    .bind(&request.description)
    .bind(request.sort_order)
    .bind(request.is_active)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_violation(e, DUPLICATE_SLUG))?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(pool): State<DbPool>,
    Path(category_id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    request.validate()?;

    let category = sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories
        SET name = $1, slug = $2, description = $3, sort_order = $4, is_active = $5
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(&request.slug)
    .bind(&request.description)
    .bind(request.sort_order)
    .bind(request.is_active)
    .bind(category_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| AppError::unique_violation(e, DUPLICATE_SLUG))?
    .ok_or(AppError::NotFound("التصنيف غير موجود"))?;

    Ok(Json(category))
}

/// Delete a category. Its products stay, uncategorized.
pub async fn delete_category(
    State(pool): State<DbPool>,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("التصنيف غير موجود"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Create a product. Currency defaults to `STORE_CURRENCY`.
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    request.validate()?;
    let currency = product_currency(&request, &state.config.store_currency);

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (
            category_id, name, description, price_cents, currency,
            duration_days, image_url, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(request.category_id)
    .bind(request.name.trim())
    .bind(&request.description)
    .bind(request.price_cents)
    .bind(currency)
    .bind(request.duration_days)
    .bind(&request.image_url)
    .bind(request.is_active)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<Product>, AppError> {
    request.validate()?;
    let currency = product_currency(&request, &state.config.store_currency);

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET category_id = $1, name = $2, description = $3, price_cents = $4,
            currency = $5, duration_days = $6, image_url = $7, is_active = $8,
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(request.category_id)
    .bind(request.name.trim())
    .bind(&request.description)
    .bind(request.price_cents)
    .bind(currency)
    .bind(request.duration_days)
    .bind(&request.image_url)
    .bind(request.is_active)
    .bind(product_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("المنتج غير موجود"))?;

    Ok(Json(product))
}

/// Deactivate a product (soft delete).
///
/// Orders reference products, so rows are kept and hidden from the storefront.
pub async fn delete_product(
    State(pool): State<DbPool>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result =
        sqlx::query("UPDATE products SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .execute(&pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("المنتج غير موجود"));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn product_currency(request: &ProductRequest, store_currency: &str) -> String {
    request
        .currency
        .as_deref()
        .unwrap_or(store_currency)
        .to_uppercase()
}
