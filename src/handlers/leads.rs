//! Lead capture handlers.
//!
//! - POST /api/leads - Public contact form
//! - GET /api/admin/leads?status= - Back-office listing
//! - PATCH /api/admin/leads/{id} - Update status or notes

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::lead::{CreateLeadRequest, Lead, LeadFilter, UpdateLeadRequest},
};

/// Record a lead from the contact form.
///
/// # Request Body
///
/// ```json
/// { "name": "سارة", "email": "sara@example.com", "phone": "+9665...", "source": "instagram" }
/// ```
///
/// - **201 Created**: the lead with status `new`
/// - **400**: missing name or malformed email
pub async fn create_lead(
    State(pool): State<DbPool>,
    Json(request): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    request.validate()?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (name, email, phone, source, message)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(request.email.trim())
    .bind(&request.phone)
    .bind(&request.source)
    .bind(&request.message)
    .fetch_one(&pool)
    .await?;

    tracing::info!(lead_id = %lead.id, source = ?lead.source, "lead captured");
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn list_leads(
    State(pool): State<DbPool>,
    Query(filter): Query<LeadFilter>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE $1::text IS NULL OR status = $1
        ORDER BY created_at DESC
        LIMIT 500
        "#,
    )
    .bind(filter.status)
    .fetch_all(&pool)
    .await?;

    Ok(Json(leads))
}

/// Update a lead. Absent fields keep their value.
pub async fn update_lead(
    State(pool): State<DbPool>,
    Path(lead_id): Path<Uuid>,
    Json(request): Json<UpdateLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    request.validate()?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        UPDATE leads
        SET status = COALESCE($1, status),
            notes = COALESCE($2, notes),
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&request.status)
    .bind(&request.notes)
    .bind(lead_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("العميل المحتمل غير موجود"))?;

    Ok(Json(lead))
}
