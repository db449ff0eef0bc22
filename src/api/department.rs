use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::department::Department,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct DepartmentPayload {
    #[schema(example = "Finance")]
    pub name: String,
    pub description: Option<String>,
}

async fn fetch_department(pool: &MySqlPool, id: u64) -> ApiResult<Department> {
    sqlx::query_as::<_, Department>(
        "SELECT id, name, description, created_at FROM departments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Department not found"))
}

fn duplicate_name(e: sqlx::Error) -> ApiError {
    if is_constraint_violation(&e) {
        ApiError::conflict("A department with this name already exists")
    } else {
        e.into()
    }
}

#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = DepartmentPayload,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 409, description = "Name already used")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<DepartmentPayload>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let result = sqlx::query("INSERT INTO departments (name, description) VALUES (?, ?)")
        .bind(name)
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await
        .map_err(duplicate_name)?;

    let id = result.last_insert_id();
    info!(department_id = id, by = auth.employee_id, "Department created");
    Ok(HttpResponse::Created().json(fetch_department(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, description = "All departments", body = [Department])),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, name, description, created_at FROM departments ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(departments))
}

#[utoipa::path(
    get,
    path = "/api/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_department(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    request_body = DepartmentPayload,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DepartmentPayload>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    fetch_department(pool.get_ref(), id).await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    sqlx::query("UPDATE departments SET name = ?, description = ? WHERE id = ?")
        .bind(name)
        .bind(&payload.description)
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(duplicate_name)?;

    Ok(HttpResponse::Ok().json(fetch_department(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    // employees.department_id is ON DELETE SET NULL
    let result = sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Department not found"));
    }
    info!(department_id = id, by = auth.employee_id, "Department deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
