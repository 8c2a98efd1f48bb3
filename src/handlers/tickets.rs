//! Support ticket handlers.
//!
//! Customer:
//! - POST /api/tickets - Open a ticket with its first message
//! - GET /api/tickets - Caller's tickets
//! - GET /api/tickets/{id} - Ticket with its message thread
//! - POST /api/tickets/{id}/messages - Customer reply
//!
//! Admin:
//! - GET /api/admin/tickets?status=
//! - PATCH /api/admin/tickets/{id} - Change status or priority
//! - POST /api/admin/tickets/{id}/messages - Staff reply, emailed to the customer

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::ticket::{
        CreateTicketRequest, Ticket, TicketFilter, TicketMessage, TicketReplyRequest,
        TicketThread, UpdateTicketRequest,
    },
    services::mailer::Email,
    state::AppState,
};

const TICKET_NOT_FOUND: &str = "التذكرة غير موجودة";

/// Open a ticket.
///
/// # Request Body
///
/// ```json
/// { "subject": "مشكلة في الدخول", "message": "...", "priority": "high" }
/// ```
///
/// - **201 Created**: ticket with its first message
pub async fn create_ticket(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketThread>), AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;

    let ticket = sqlx::query_as::<_, Ticket>(
        r#"
        INSERT INTO tickets (user_id, email, subject, priority)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(request.subject.trim())
    .bind(request.priority.as_deref().unwrap_or("normal"))
    .fetch_one(&mut *tx)
    .await?;

    let message =
        insert_message(&mut tx, ticket.id, "customer", &user.email, &request.message).await?;

    tx.commit().await?;

    tracing::info!(ticket_id = %ticket.id, "ticket opened");
    Ok((
        StatusCode::CREATED,
        Json(TicketThread {
            ticket,
            messages: vec![message],
        }),
    ))
}

pub async fn list_my_tickets(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE user_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(tickets))
}

/// Ticket with its messages, oldest first. Other users' tickets read as
/// missing.
pub async fn get_my_ticket(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketThread>, AppError> {
    let ticket = get_ticket_for_user(&pool, ticket_id, user.id).await?;
    let messages = load_messages(&pool, ticket.id).await?;

    Ok(Json(TicketThread { ticket, messages }))
}

/// Customer reply. A ticket waiting on the customer (`pending`) goes back
/// to `open`.
pub async fn customer_reply(
    State(pool): State<DbPool>,
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TicketReplyRequest>,
) -> Result<(StatusCode, Json<TicketMessage>), AppError> {
    request.validate()?;
    let ticket = get_ticket_for_user(&pool, ticket_id, user.id).await?;

    let mut tx = pool.begin().await?;
    let message = insert_message(&mut tx, ticket.id, "customer", &user.email, &request.body).await?;
    sqlx::query(
        r#"
        UPDATE tickets
        SET status = CASE WHEN status = 'pending' THEN 'open' ELSE status END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(ticket.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn admin_list_tickets(
    State(pool): State<DbPool>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT * FROM tickets
        WHERE $1::text IS NULL OR status = $1
        ORDER BY updated_at DESC
        LIMIT 500
        "#,
    )
    .bind(filter.status)
    .fetch_all(&pool)
    .await?;

    Ok(Json(tickets))
}

pub async fn admin_update_ticket(
    State(pool): State<DbPool>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    request.validate()?;

    let ticket = sqlx::query_as::<_, Ticket>(
        r#"
        UPDATE tickets
        SET status = COALESCE($1, status),
            priority = COALESCE($2, priority),
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&request.status)
    .bind(&request.priority)
    .bind(ticket_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(TICKET_NOT_FOUND))?;

    Ok(Json(ticket))
}

/// Staff reply. The ticket moves to `pending` (waiting on the customer) and
/// the customer gets the reply by email.
pub async fn admin_reply(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TicketReplyRequest>,
) -> Result<(StatusCode, Json<TicketMessage>), AppError> {
    request.validate()?;

    let mut tx = state.pool.begin().await?;
    let ticket = sqlx::query_as::<_, Ticket>(
        "UPDATE tickets SET status = 'pending', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(ticket_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(TICKET_NOT_FOUND))?;

    let message = insert_message(&mut tx, ticket.id, "admin", &admin.email, &request.body).await?;
    tx.commit().await?;

    state
        .mailer
        .send_logged(Email::ticket_reply(&ticket.email, &ticket.subject, &message.body))
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_ticket_for_user(
    pool: &DbPool,
    ticket_id: Uuid,
    user_id: Uuid,
) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 AND user_id = $2")
        .bind(ticket_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound(TICKET_NOT_FOUND))
}

async fn load_messages(pool: &DbPool, ticket_id: Uuid) -> Result<Vec<TicketMessage>, AppError> {
    let messages = sqlx::query_as::<_, TicketMessage>(
        "SELECT * FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ticket_id: Uuid,
    author_role: &str,
    author_email: &str,
    body: &str,
) -> Result<TicketMessage, AppError> {
    let message = sqlx::query_as::<_, TicketMessage>(
        r#"
        INSERT INTO ticket_messages (ticket_id, author_role, author_email, body)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(ticket_id)
    .bind(author_role)
    .bind(author_email)
    .bind(body.trim())
    .fetch_one(&mut **tx)
    .await?;

    Ok(message)
}
