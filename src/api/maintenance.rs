use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        maintenance::{GLOBAL_FLAG, MaintenanceFlag},
        role::Role,
    },
    utils::maintenance_cache,
};
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web,
};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

const DEFAULT_MESSAGE: &str = "The service is under maintenance, please retry later";

#[derive(Deserialize, ToSchema)]
pub struct SetMaintenance {
    pub enabled: bool,
    #[schema(example = "Scheduled upgrade, back at 14:00")]
    pub message: Option<String>,
}

/// Requests that pass while the global flag is on.
fn bypasses(role: Option<Role>, path: &str) -> bool {
    role == Some(Role::Admin) || path.trim_end_matches('/').ends_with("/maintenance")
}

/// Answers 503 to non-admins while the global flag is enabled.
/// Must run after `auth_middleware` so the caller's role is known.
pub async fn maintenance_guard(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let role = req.extensions().get::<AuthUser>().map(|u| u.role);
    if bypasses(role, req.path()) {
        return next.call(req).await;
    }

    let Some(pool) = req.app_data::<web::Data<MySqlPool>>().cloned() else {
        return next.call(req).await;
    };

    match maintenance_cache::load_flag(pool.get_ref(), GLOBAL_FLAG).await {
        Ok(flag) if flag.enabled => {
            let message = flag.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
            let resp = ApiError::Unavailable(message).error_response();
            Ok(req.into_response(resp))
        }
        Ok(_) => next.call(req).await,
        Err(e) => {
            // an unreadable flag must not take the whole API down
            warn!(error = %e, "Maintenance flag lookup failed");
            next.call(req).await
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/maintenance",
    responses((status = 200, description = "Current global maintenance flag", body = MaintenanceFlag)),
    tag = "Maintenance",
    security(("bearer_auth" = []))
)]
pub async fn get_maintenance(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let flag = maintenance_cache::load_flag(pool.get_ref(), GLOBAL_FLAG).await?;
    Ok(HttpResponse::Ok().json(flag))
}

#[utoipa::path(
    put,
    path = "/api/maintenance",
    request_body = SetMaintenance,
    responses(
        (status = 200, description = "Flag stored, cache invalidated", body = MaintenanceFlag),
        (status = 403, description = "Admin only")
    ),
    tag = "Maintenance",
    security(("bearer_auth" = []))
)]
pub async fn set_maintenance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetMaintenance>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let message = payload
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    sqlx::query(
        r#"
        INSERT INTO maintenance_flags (name, enabled, message) VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE enabled = VALUES(enabled), message = VALUES(message)
        "#,
    )
    .bind(GLOBAL_FLAG)
    .bind(payload.enabled)
    .bind(message)
    .execute(pool.get_ref())
    .await?;

    maintenance_cache::invalidate(GLOBAL_FLAG).await;
    info!(enabled = payload.enabled, by = auth.employee_id, "Maintenance flag updated");

    let flag = maintenance_cache::load_flag(pool.get_ref(), GLOBAL_FLAG).await?;
    Ok(HttpResponse::Ok().json(flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_and_the_flag_endpoint_bypass_the_guard() {
        assert!(bypasses(Some(Role::Admin), "/api/employees"));
        assert!(bypasses(Some(Role::Employee), "/api/maintenance"));
        assert!(bypasses(None, "/api/maintenance/"));
        assert!(!bypasses(Some(Role::Hr), "/api/conges"));
        assert!(!bypasses(None, "/api/conges"));
    }
}
