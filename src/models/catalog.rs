//! Catalog data models: categories and the products sold in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Represents a category record from the database.
///
/// # Database Table
///
/// Maps to the `categories` table. `slug` is unique and is what the
/// storefront filters products by.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Represents a product record from the database.
///
/// # Pricing
///
/// Prices are stored as `i64` cents, the same way order totals are.
/// `duration_days` is how long a subscription bought from this product lasts.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or replacing a category.
///
/// ```json
/// { "name": "Streaming", "slug": "streaming", "sort_order": 1 }
/// ```
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CategoryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("اسم التصنيف مطلوب".to_string()));
        }
        if !is_valid_slug(&self.slug) {
            return Err(AppError::InvalidRequest(
                "المعرّف النصي يجب أن يحتوي على أحرف إنجليزية صغيرة وأرقام وشرطات فقط".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request body for creating or replacing a product.
///
/// ```json
/// {
///   "category_id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "Netflix Premium - 1 Month",
///   "price_cents": 1299,
///   "duration_days": 30
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Defaults to the store currency when omitted
    pub currency: Option<String>,
    pub duration_days: i32,
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("اسم المنتج مطلوب".to_string()));
        }
        if self.price_cents < 0 {
            return Err(AppError::InvalidRequest("السعر لا يمكن أن يكون سالباً".to_string()));
        }
        if self.duration_days <= 0 {
            return Err(AppError::InvalidRequest("مدة الاشتراك يجب أن تكون أكبر من صفر".to_string()));
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AppError::InvalidRequest("رمز العملة غير صالح".to_string()));
            }
        }
        Ok(())
    }
}

/// Query string for the public product listing.
#[derive(Debug, Deserialize)]
pub struct ProductFilter {
    /// Category slug
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
