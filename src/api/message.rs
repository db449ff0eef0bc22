use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::{message::Message, notification::NotificationKind},
    service::notifier::Notifier,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, body, is_read, created_at";

#[derive(Deserialize, ToSchema)]
pub struct SendMessage {
    #[schema(example = 4)]
    pub recipient_id: u64,
    #[schema(example = "Can we move the review to Thursday?")]
    pub body: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MessageQuery {
    /// Conversation with this employee, both directions
    pub with: Option<u64>,
}

async fn fetch_message(pool: &MySqlPool, id: u64) -> ApiResult<Message> {
    sqlx::query_as::<_, Message>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))
}

fn preview(body: &str) -> String {
    const LEN: usize = 80;
    if body.chars().count() <= LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LEN).collect();
        format!("{cut}...")
    }
}

#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SendMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Empty body or unknown recipient")
    ),
    tag = "Message",
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    payload: web::Json<SendMessage>,
) -> ApiResult<HttpResponse> {
    let body = payload.body.trim();
    if body.is_empty() {
        return Err(ApiError::bad_request("Message body must not be empty"));
    }
    if payload.recipient_id == auth.employee_id {
        return Err(ApiError::bad_request("You cannot message yourself"));
    }

    let id = sqlx::query("INSERT INTO messages (sender_id, recipient_id, body) VALUES (?, ?, ?)")
        .bind(auth.employee_id)
        .bind(payload.recipient_id)
        .bind(body)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::bad_request("recipient_id does not reference an employee")
            } else {
                e.into()
            }
        })?
        .last_insert_id();

    notifier
        .notify(
            payload.recipient_id,
            NotificationKind::Message,
            &format!("New message from {}", auth.email),
            &preview(body),
        )
        .await;

    Ok(HttpResponse::Created().json(fetch_message(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/messages",
    params(MessageQuery),
    responses((status = 200, description = "Inbox, or one conversation when `with` is set", body = [Message])),
    tag = "Message",
    security(("bearer_auth" = []))
)]
pub async fn list_messages(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MessageQuery>,
) -> ApiResult<HttpResponse> {
    let messages = match query.with {
        Some(other) => {
            sqlx::query_as::<_, Message>(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE (sender_id = ? AND recipient_id = ?)
                   OR (sender_id = ? AND recipient_id = ?)
                ORDER BY created_at, id
                "#
            ))
            .bind(auth.employee_id)
            .bind(other)
            .bind(other)
            .bind(auth.employee_id)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, Message>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE recipient_id = ? ORDER BY created_at DESC, id DESC"
            ))
            .bind(auth.employee_id)
            .fetch_all(pool.get_ref())
            .await?
        }
    };
    Ok(HttpResponse::Ok().json(messages))
}

#[utoipa::path(
    put,
    path = "/api/messages/{id}/read",
    params(("id" = u64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Marked as read", body = Message),
        (status = 403, description = "Only the recipient can mark a message read")
    ),
    tag = "Message",
    security(("bearer_auth" = []))
)]
pub async fn mark_message_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let message = fetch_message(pool.get_ref(), path.into_inner()).await?;
    if message.recipient_id != auth.employee_id {
        return Err(ApiError::forbidden("Only the recipient can mark a message read"));
    }
    sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = ?")
        .bind(message.id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(fetch_message(pool.get_ref(), message.id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    params(("id" = u64, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message deleted"),
        (status = 403, description = "Only the sender or recipient")
    ),
    tag = "Message",
    security(("bearer_auth" = []))
)]
pub async fn delete_message(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let message = fetch_message(pool.get_ref(), path.into_inner()).await?;
    if message.sender_id != auth.employee_id && message.recipient_id != auth.employee_id {
        return Err(ApiError::forbidden("Only the sender or recipient can delete a message"));
    }
    sqlx::query("DELETE FROM messages WHERE id = ?")
        .bind(message.id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_shortened_for_the_notification() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 83);
        assert!(p.ends_with("..."));
    }
}
