//! Affiliate (commissioner) models.
//!
//! A commissioner owns one promo code. Orders placed with the code get
//! `discount_percent` off, and once paid earn the commissioner
//! `commission_rate_bp` basis points of what the customer paid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

const MAX_RATE_BP: i32 = 10_000;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Commissioner {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Stored upper-case, matched case-insensitively
    pub promo_code: String,
    /// Commission in basis points (1% = 100)
    pub commission_rate_bp: i32,
    pub discount_percent: i32,
    pub usage_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Commissioner {
    /// Discount on `price_cents`, rounded down.
    pub fn discount_for(&self, price_cents: i64) -> i64 {
        price_cents * i64::from(self.discount_percent) / 100
    }

    /// Commission earned on `paid_cents`, rounded down.
    pub fn commission_for(&self, paid_cents: i64) -> i64 {
        paid_cents * i64::from(self.commission_rate_bp) / i64::from(MAX_RATE_BP)
    }
}

/// Request body for creating or replacing a commissioner.
///
/// ```json
/// {
///   "name": "Sara",
///   "email": "sara@example.com",
///   "promo_code": "sara10",
///   "commission_rate_bp": 1500,
///   "discount_percent": 10
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CommissionerRequest {
    pub name: String,
    pub email: String,
    pub promo_code: String,
    pub commission_rate_bp: i32,
    #[serde(default)]
    pub discount_percent: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CommissionerRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("اسم المسوّق مطلوب".to_string()));
        }
        if !self.email.contains('@') {
            return Err(AppError::InvalidRequest("البريد الإلكتروني غير صالح".to_string()));
        }
        let code = self.promo_code.trim();
        if code.len() < 3 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidRequest(
                "كود الخصم يجب أن يتكون من 3 أحرف أو أرقام إنجليزية على الأقل".to_string(),
            ));
        }
        if !(0..=MAX_RATE_BP).contains(&self.commission_rate_bp) {
            return Err(AppError::InvalidRequest("نسبة العمولة غير صالحة".to_string()));
        }
        if !(0..=100).contains(&self.discount_percent) {
            return Err(AppError::InvalidRequest("نسبة الخصم غير صالحة".to_string()));
        }
        Ok(())
    }

    pub fn normalized_code(&self) -> String {
        normalize_code(&self.promo_code)
    }
}

/// Request body for the public promo-code preview.
#[derive(Debug, Deserialize)]
pub struct ValidatePromoRequest {
    pub code: String,
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PromoPreview {
    pub code: String,
    pub discount_percent: i32,
    pub price_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Earnings {
    pub orders: i64,
    pub unpaid_cents: i64,
    pub paid_out_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub commissioner: Commissioner,
    #[serde(flatten)]
    pub earnings: Earnings,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn default_true() -> bool {
    true
}
