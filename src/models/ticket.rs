//! Support ticket models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const TICKET_STATUSES: [&str; 3] = ["open", "pending", "closed"];
pub const TICKET_PRIORITIES: [&str; 3] = ["low", "normal", "high"];

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub subject: String,
    /// `open`: waiting on support, `pending`: waiting on the customer
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    /// `customer` or `admin`
    pub author_role: String,
    pub author_email: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TicketThread {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub message: String,
    pub priority: Option<String>,
}

impl CreateTicketRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject.trim().is_empty() {
            return Err(AppError::InvalidRequest("عنوان التذكرة مطلوب".to_string()));
        }
        validate_body(&self.message)?;
        if let Some(priority) = &self.priority {
            if !TICKET_PRIORITIES.contains(&priority.as_str()) {
                return Err(AppError::InvalidRequest(format!("أولوية غير معروفة: {priority}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct TicketReplyRequest {
    pub body: String,
}

impl TicketReplyRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_body(&self.body)
    }
}

/// Admin update; absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl UpdateTicketRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(status) = &self.status {
            if !TICKET_STATUSES.contains(&status.as_str()) {
                return Err(AppError::InvalidRequest(format!("حالة غير معروفة: {status}")));
            }
        }
        if let Some(priority) = &self.priority {
            if !TICKET_PRIORITIES.contains(&priority.as_str()) {
                return Err(AppError::InvalidRequest(format!("أولوية غير معروفة: {priority}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
}

fn validate_body(body: &str) -> Result<(), AppError> {
    if body.trim().is_empty() {
        return Err(AppError::InvalidRequest("نص الرسالة مطلوب".to_string()));
    }
    if body.chars().count() > 5_000 {
        return Err(AppError::InvalidRequest("الرسالة طويلة جداً".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_validation() {
        let req = CreateTicketRequest {
            subject: "لا يعمل الحساب".into(),
            message: "كلمة المرور غير صحيحة".into(),
            priority: Some("high".into()),
        };
        assert!(req.validate().is_ok());

        let req = CreateTicketRequest {
            subject: "x".into(),
            message: "   ".into(),
            priority: None,
        };
        assert!(req.validate().is_err());

        let req = UpdateTicketRequest {
            status: Some("resolved".into()),
            priority: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn overly_long_reply_is_rejected() {
        let req = TicketReplyRequest {
            body: "ا".repeat(5_001),
        };
        assert!(req.validate().is_err());
    }
}
