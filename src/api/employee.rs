use crate::{
    auth::{
        auth::AuthUser,
        password::{hash_password, validate_password_policy},
    },
    config::Config,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeStatus},
        role::Role,
    },
    service::{hierarchy, ledger},
    utils::{
        db_utils::{Conditions, SqlUpdate, bind_values, nullable},
        email_filter,
        pagination::Page,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-3000")]
    pub employee_code: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    #[schema(example = "initial-pass-123")]
    pub password: String,
    pub phone: Option<String>,
    /// Defaults to `employee`
    pub role: Option<Role>,
    #[schema(example = 1)]
    pub department_id: Option<u64>,
    #[schema(example = 3)]
    pub chef_id: Option<u64>,
    #[schema(example = "Accountant")]
    pub job_title: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
    /// Defaults to `active`
    pub status: Option<EmployeeStatus>,
}

/// Partial update. `null` clears an optional column, the password has its own endpoint.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateEmployee {
    pub employee_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[schema(format = "email")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u64>)]
    pub department_id: Option<Option<u64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u64>)]
    pub chef_id: Option<Option<u64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub job_title: Option<Option<String>>,
    #[schema(format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    pub status: Option<EmployeeStatus>,
}

impl UpdateEmployee {
    fn to_update(&self) -> SqlUpdate {
        let mut update = SqlUpdate::new("employees");
        update
            .set("employee_code", self.employee_code.as_deref().map(str::trim))
            .set("first_name", self.first_name.as_deref().map(str::trim))
            .set("last_name", self.last_name.as_deref().map(str::trim))
            .set("email", self.email.clone())
            .set("phone", self.phone.clone())
            .set("role", self.role.map(|r| r.to_string()))
            .set("department_id", self.department_id)
            .set("chef_id", self.chef_id)
            .set("job_title", self.job_title.clone())
            .set("hire_date", self.hire_date)
            .set("status", self.status.map(|s| s.to_string()));
        update
    }

    fn blank_required_field(&self) -> Option<&'static str> {
        [
            ("employee_code", &self.employee_code),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
        ]
        .into_iter()
        .find(|(_, value)| value.as_deref().is_some_and(|v| v.trim().is_empty()))
        .map(|(field, _)| field)
    }
}

/// Admin accounts, and promotions to admin, are reserved to admins.
fn needs_admin(target: &Employee, patch: &UpdateEmployee) -> bool {
    target.is_admin() || patch.role == Some(Role::Admin)
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub department_id: Option<u64>,
    pub chef_id: Option<u64>,
    pub role: Option<String>,
    pub status: Option<String>,
    /// Search by name or email
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address"))
    }
}

/// A chef must exist, and for an existing employee must not close a reporting loop.
async fn validate_chef(pool: &MySqlPool, employee_id: Option<u64>, chef_id: u64) -> ApiResult<()> {
    match hierarchy::chef_of(pool, chef_id).await {
        Ok(_) => {}
        Err(ApiError::NotFound(_)) => {
            return Err(ApiError::bad_request("chef_id does not reference an employee"));
        }
        Err(e) => return Err(e),
    }
    let Some(employee_id) = employee_id else {
        return Ok(());
    };
    if chef_id == employee_id {
        return Err(ApiError::bad_request("An employee cannot be their own chef"));
    }
    if hierarchy::would_create_cycle(pool, employee_id, chef_id).await? {
        return Err(ApiError::bad_request("chef_id would create a reporting cycle"));
    }
    Ok(())
}

pub async fn fetch_employee(pool: &MySqlPool, id: u64) -> ApiResult<Employee> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Employee not found"))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created, leave balance initialised", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email or employee code already used", body = Object, example = json!({
            "message": "Email already registered"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::bad_request("first_name and last_name are required"));
    }
    if payload.employee_code.trim().is_empty() {
        return Err(ApiError::bad_request("employee_code is required"));
    }
    let email = email_filter::normalize(&payload.email);
    validate_email(&email)?;
    validate_password_policy(&payload.password).map_err(ApiError::bad_request)?;

    let role = payload.role.unwrap_or(Role::Employee);
    if role == Role::Admin {
        auth.require_admin()?;
    }

    if !email_filter::is_email_available(&email, pool.get_ref()).await? {
        return Err(ApiError::conflict("Email already registered"));
    }
    if let Some(chef_id) = payload.chef_id {
        validate_chef(pool.get_ref(), None, chef_id).await?;
    }
    let status = payload.status.unwrap_or(EmployeeStatus::Active);

    let hashed = hash_password(&payload.password)
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, first_name, last_name, email, phone, password, role,
         department_id, chef_id, job_title, hire_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&email)
    .bind(&payload.phone)
    .bind(hashed)
    .bind(role.to_string())
    .bind(payload.department_id)
    .bind(payload.chef_id)
    .bind(&payload.job_title)
    .bind(payload.hire_date)
    .bind(status.to_string())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_constraint_violation(&e) {
            ApiError::conflict("Email or employee code already used, or unknown department")
        } else {
            e.into()
        }
    })?;

    let id = result.last_insert_id();
    email_filter::insert(&email);
    ledger::initialise(pool.get_ref(), id, config.default_leave_days).await?;
    info!(employee_id = id, by = auth.employee_id, "Employee created");

    let employee = fetch_employee(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(employee))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let page = Page::resolve(query.page, query.per_page);

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Conditions::new();

    if let Some(department_id) = query.department_id {
        conditions.push("department_id = ?", [department_id]);
    }

    if let Some(chef_id) = query.chef_id {
        conditions.push("chef_id = ?", [chef_id]);
    }

    if let Some(role) = &query.role {
        let role = Role::from_str(role).map_err(|_| ApiError::bad_request("Unknown role"))?;
        conditions.push("role = ?", [role.to_string()]);
    }

    if let Some(status) = &query.status {
        let status = EmployeeStatus::from_str(status)
            .map_err(|_| ApiError::bad_request("status must be active or inactive"))?;
        conditions.push("status = ?", [status.to_string()]);
    }

    if let Some(search) = &query.search {
        let like = format!("%{}%", search);
        conditions.push(
            "(first_name LIKE ? OR last_name LIKE ? OR email LIKE ?)",
            [like.clone(), like.clone(), like],
        );
    }

    let where_clause = conditions.where_sql();

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) as total FROM employees{}", where_clause);
    debug!(sql = %count_sql, bindings = ?conditions.values(), "Counting employees");

    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.values())
        .fetch_one(pool.get_ref())
        .await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees{} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page = page.page, per_page = page.per_page, "Fetching employees");

    let employees = bind_values!(sqlx::query_as::<_, Employee>(&data_sql), conditions.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated successfully", body = Employee),
        (status = 400, description = "Unknown field, bad status or invalid chef"),
        (status = 403, description = "Admin accounts can only be changed by an admin"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    let current = fetch_employee(pool.get_ref(), employee_id).await?;
    let mut patch = payload.into_inner();

    if needs_admin(&current, &patch) {
        auth.require_admin()?;
    }
    if let Some(field) = patch.blank_required_field() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    if let Some(email) = patch.email.as_mut() {
        *email = email_filter::normalize(email);
        validate_email(email)?;
    }
    if let Some(Some(chef_id)) = patch.chef_id {
        validate_chef(pool.get_ref(), Some(employee_id), chef_id).await?;
    }

    let update = patch.to_update();
    if update.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }
    update.execute(pool.get_ref(), employee_id).await.map_err(|e| {
        if is_constraint_violation(&e) {
            ApiError::conflict("Update violates a uniqueness or reference constraint")
        } else {
            e.into()
        }
    })?;

    if let Some(email) = patch.email.as_deref().filter(|e| *e != current.email) {
        email_filter::remove(&current.email);
        email_filter::insert(email);
    }
    info!(employee_id, by = auth.employee_id, "Employee updated");

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();
    if employee_id == auth.employee_id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;

    sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    email_filter::remove(&employee.email);
    info!(employee_id, by = auth.employee_id, "Employee deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    if !auth.role.can_manage() && auth.employee_id != employee_id {
        return Err(ApiError::forbidden("Not allowed to view this employee"));
    }
    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}/subordinates",
    params(("employee_id" = u64, Path, description = "Chef employee ID")),
    responses(
        (status = 200, description = "Employees whose chef is this employee", body = [Employee])
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_subordinates(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let chef_id = path.into_inner();
    if !auth.is_self_or_hr(chef_id) {
        return Err(ApiError::forbidden("Not allowed to view this team"));
    }
    let team = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE chef_id = ? ORDER BY last_name, first_name"
    ))
    .bind(chef_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(team))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format_check() {
        assert!(validate_email("jane@corp.io").is_ok());
        assert!(validate_email("@corp.io").is_err());
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane").is_err());
    }

    fn employee(role: Role) -> Employee {
        Employee {
            id: 1,
            employee_code: "ADMIN-0001".into(),
            first_name: "Ada".into(),
            last_name: "Root".into(),
            email: "ada@corp.io".into(),
            phone: None,
            role: role.to_string(),
            department_id: None,
            chef_id: None,
            job_title: None,
            hire_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            status: EmployeeStatus::Active.to_string(),
            created_at: None,
        }
    }

    #[test]
    fn password_and_unknown_fields_are_refused() {
        assert!(serde_json::from_value::<UpdateEmployee>(json!({"password": "plain"})).is_err());
        assert!(serde_json::from_value::<UpdateEmployee>(json!({"salary": 10})).is_err());
    }

    #[test]
    fn status_must_be_a_known_label() {
        assert!(serde_json::from_value::<UpdateEmployee>(json!({"status": "Active"})).is_err());
        let patch: UpdateEmployee = serde_json::from_value(json!({"status": "inactive"})).unwrap();
        assert_eq!(patch.status, Some(EmployeeStatus::Inactive));
        let (sql, _) = patch.to_update().build(3);
        assert_eq!(sql, "UPDATE employees SET status = ? WHERE id = ?");
    }

    #[test]
    fn any_change_to_an_admin_needs_an_admin() {
        let email_only: UpdateEmployee =
            serde_json::from_value(json!({"email": "new@corp.io"})).unwrap();
        assert!(needs_admin(&employee(Role::Admin), &email_only));
        assert!(!needs_admin(&employee(Role::Employee), &email_only));

        let promotion: UpdateEmployee = serde_json::from_value(json!({"role": "admin"})).unwrap();
        assert!(needs_admin(&employee(Role::Chef), &promotion));
    }

    #[test]
    fn null_clears_the_chef_and_blank_names_are_caught() {
        let patch: UpdateEmployee =
            serde_json::from_value(json!({"chef_id": null, "first_name": "  "})).unwrap();
        assert_eq!(patch.chef_id, Some(None));
        assert_eq!(patch.blank_required_field(), Some("first_name"));

        let (sql, values) = UpdateEmployee { chef_id: Some(None), ..Default::default() }
            .to_update()
            .build(5);
        assert_eq!(sql, "UPDATE employees SET chef_id = ? WHERE id = ?");
        assert_eq!(values[0], crate::utils::db_utils::SqlValue::Null);
    }
}
