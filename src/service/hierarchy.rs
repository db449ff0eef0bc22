use sqlx::MySqlPool;

use crate::auth::auth::AuthUser;
use crate::error::{ApiError, ApiResult};

/// Manager of `employee_id`; 404 when the employee does not exist.
pub async fn chef_of(pool: &MySqlPool, employee_id: u64) -> ApiResult<Option<u64>> {
    sqlx::query_scalar::<_, Option<u64>>("SELECT chef_id FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

/// Self, HR/Admin, or the employee's direct chef.
pub async fn ensure_can_view(pool: &MySqlPool, auth: &AuthUser, employee_id: u64) -> ApiResult<()> {
    if auth.is_self_or_hr(employee_id) {
        return Ok(());
    }
    if chef_of(pool, employee_id).await? == Some(auth.employee_id) {
        return Ok(());
    }
    Err(ApiError::forbidden("Not allowed to access this employee's records"))
}

/// HR/Admin, or the employee's direct chef. Nobody manages themselves.
pub async fn ensure_manages(pool: &MySqlPool, auth: &AuthUser, employee_id: u64) -> ApiResult<()> {
    if auth.employee_id == employee_id {
        return Err(ApiError::forbidden("You cannot act on your own record here"));
    }
    if auth.is_hr_or_admin() || chef_of(pool, employee_id).await? == Some(auth.employee_id) {
        return Ok(());
    }
    Err(ApiError::forbidden("Only the employee's chef or HR/Admin can do this"))
}

/// Walks the chef chain from `chef_id` upwards; true if it reaches `employee_id`.
pub async fn would_create_cycle(
    pool: &MySqlPool,
    employee_id: u64,
    chef_id: u64,
) -> ApiResult<bool> {
    let mut current = Some(chef_id);
    // chains deeper than this are treated as cyclic
    for _ in 0..64 {
        match current {
            None => return Ok(false),
            Some(id) if id == employee_id => return Ok(true),
            Some(id) => current = chef_of(pool, id).await?,
        }
    }
    Ok(true)
}
