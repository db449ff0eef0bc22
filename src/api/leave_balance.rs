use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::ApiResult;
use crate::model::leave_balance::{LeaveBalance, LeaveHistoryEntry};
use crate::service::{hierarchy, ledger};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct AdjustBalance {
    #[schema(example = 25)]
    pub total_days: i32,
}

#[utoipa::path(
    get,
    path = "/api/leave-balances/me",
    responses(
        (status = 200, description = "Caller's balance, created at the default allowance on first access", body = LeaveBalance),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave balance"
)]
pub async fn my_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let balance =
        ledger::get_or_create(pool.get_ref(), auth.employee_id, config.default_leave_days).await?;
    Ok(HttpResponse::Ok().json(balance))
}

#[utoipa::path(
    get,
    path = "/api/leave-balances/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Balance of the employee", body = LeaveBalance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave balance"
)]
pub async fn get_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    hierarchy::ensure_can_view(pool.get_ref(), &auth, employee_id).await?;
    let balance =
        ledger::get_or_create(pool.get_ref(), employee_id, config.default_leave_days).await?;
    Ok(HttpResponse::Ok().json(balance))
}

#[utoipa::path(
    put,
    path = "/api/leave-balances/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = AdjustBalance,
    responses(
        (status = 200, description = "Total adjusted, remaining recomputed", body = LeaveBalance),
        (status = 400, description = "Total below days already used"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave balance"
)]
pub async fn adjust_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<AdjustBalance>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    hierarchy::chef_of(pool.get_ref(), employee_id).await?;

    let balance = ledger::adjust_total(
        pool.get_ref(),
        employee_id,
        payload.total_days,
        config.default_leave_days,
    )
    .await?;
    tracing::info!(employee_id, total_days = balance.total_days, by = auth.employee_id, "Leave allowance adjusted");
    Ok(HttpResponse::Ok().json(balance))
}

#[utoipa::path(
    get,
    path = "/api/leave-balances/{employee_id}/history",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Ledger history, newest first", body = [LeaveHistoryEntry]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave balance"
)]
pub async fn balance_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    hierarchy::ensure_can_view(pool.get_ref(), &auth, employee_id).await?;
    let entries = ledger::history(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(entries))
}
