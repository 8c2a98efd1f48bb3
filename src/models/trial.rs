//! Trial code models.

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const CODE_LENGTH: usize = 10;
const MAX_BATCH: u32 = 500;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TrialCode {
    pub id: Uuid,
    pub code: String,
    pub product_id: Uuid,
    pub duration_days: i32,
    pub max_uses: i32,
    pub used_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TrialCode {
    /// Why this code cannot be redeemed at `now`, if it cannot.
    pub fn unusable_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.expires_at.is_some_and(|at| at <= now) {
            Some("انتهت صلاحية كود التجربة")
        } else if self.used_count >= self.max_uses {
            Some("تم استخدام كود التجربة بالكامل")
        } else {
            None
        }
    }
}

/// Admin request to mint a batch of codes.
///
/// ```json
/// { "product_id": "550e8400-...", "count": 20, "duration_days": 3, "max_uses": 1 }
/// ```
#[derive(Debug, Deserialize)]
pub struct GenerateTrialCodesRequest {
    pub product_id: Uuid,
    pub count: u32,
    pub duration_days: i32,
    #[serde(default = "default_max_uses")]
    pub max_uses: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl GenerateTrialCodesRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.count == 0 || self.count > MAX_BATCH {
            return Err(AppError::InvalidRequest(format!(
                "عدد الأكواد يجب أن يكون بين 1 و {MAX_BATCH}"
            )));
        }
        if self.duration_days <= 0 {
            return Err(AppError::InvalidRequest("مدة التجربة يجب أن تكون أكبر من صفر".to_string()));
        }
        if self.max_uses <= 0 {
            return Err(AppError::InvalidRequest("عدد الاستخدامات يجب أن يكون أكبر من صفر".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemTrialRequest {
    pub code: String,
}

fn default_max_uses() -> i32 {
    1
}

/// Random upper-case alphanumeric code.
pub fn generate_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(max_uses: i32, used: i32, expires_at: Option<DateTime<Utc>>) -> TrialCode {
        TrialCode {
            id: Uuid::nil(),
            code: "ABCDEFGHJK".into(),
            product_id: Uuid::nil(),
            duration_days: 3,
            max_uses,
            used_count: used,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn generated_codes_are_upper_alphanumeric() {
        let c = generate_code();
        assert_eq!(c.len(), CODE_LENGTH);
        assert!(c.chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
    }

    #[test]
    fn usability() {
        let now = Utc::now();
        assert!(code(1, 0, None).unusable_reason(now).is_none());
        assert!(code(1, 1, None).unusable_reason(now).is_some());
        assert!(code(5, 0, Some(now - Duration::hours(1))).unusable_reason(now).is_some());
        assert!(code(5, 0, Some(now + Duration::hours(1))).unusable_reason(now).is_none());
    }

    #[test]
    fn batch_bounds() {
        let mut req = GenerateTrialCodesRequest {
            product_id: Uuid::nil(),
            count: 10,
            duration_days: 3,
            max_uses: 1,
            expires_at: None,
        };
        assert!(req.validate().is_ok());
        req.count = 0;
        assert!(req.validate().is_err());
        req.count = MAX_BATCH + 1;
        assert!(req.validate().is_err());
    }
}
