//! CRM lead models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const LEAD_STATUSES: [&str; 4] = ["new", "contacted", "converted", "lost"];

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public contact-form submission.
#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
}

impl CreateLeadRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("الاسم مطلوب".to_string()));
        }
        if !self.email.contains('@') {
            return Err(AppError::InvalidRequest("البريد الإلكتروني غير صالح".to_string()));
        }
        Ok(())
    }
}

/// Admin update; absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

impl UpdateLeadRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.status {
            Some(status) if !LEAD_STATUSES.contains(&status.as_str()) => Err(
                AppError::InvalidRequest(format!("حالة غير معروفة: {status}")),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadFilter {
    pub status: Option<String>,
}
