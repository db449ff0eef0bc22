use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::notification::Notification,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Caller's notifications, newest first", body = [Notification])),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, recipient_id, kind, title, message, is_read, created_at
        FROM notifications
        WHERE recipient_id = ? AND (? = FALSE OR is_read = FALSE)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(auth.employee_id)
    .bind(query.unread_only)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(notifications))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(("id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read"),
        (status = 404, description = "No such notification for the caller")
    ),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE id = ? AND recipient_id = ?",
    )
    .bind(id)
    .bind(auth.employee_id)
    .fetch_one(pool.get_ref())
    .await?;
    if found == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Notification marked as read" })))
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses((status = 200, description = "Every unread notification marked as read", body = Object, example = json!({
        "updated": 3
    }))),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn mark_all_read(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE",
    )
    .bind(auth.employee_id)
    .execute(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": result.rows_affected() })))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(("id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification deleted"),
        (status = 404, description = "No such notification for the caller")
    ),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn delete_notification(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
        .bind(path.into_inner())
        .bind(auth.employee_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
