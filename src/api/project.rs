use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        project::{Project, ProjectStatus, compute_progress},
        task::Task,
    },
    utils::pagination::{Page, PageQuery},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::ToSchema;

const PROJECT_COLUMNS: &str =
    "id, name, description, chef_id, start_date, end_date, status, progress, created_at";

#[derive(Deserialize, ToSchema)]
pub struct ProjectPayload {
    #[schema(example = "Payroll migration")]
    pub name: String,
    pub description: Option<String>,
    /// Defaults to the caller when a chef creates the project
    pub chef_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub status: Option<ProjectStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<Project>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl ProjectPayload {
    fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("name is required"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ApiError::bad_request("end_date must not be before start_date"));
            }
        }
        Ok(())
    }
}

pub async fn fetch_project(pool: &MySqlPool, id: u64) -> ApiResult<Project> {
    sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// HR/Admin, or the chef leading the project.
pub fn can_manage_project(auth: &AuthUser, project: &Project) -> bool {
    auth.is_hr_or_admin() || project.chef_id == Some(auth.employee_id)
}

/// Stores the mean completion of the project's tasks as its progress.
pub async fn refresh_progress(pool: &MySqlPool, project_id: u64) -> Result<i32, sqlx::Error> {
    let completions =
        sqlx::query_scalar::<_, i32>("SELECT completion FROM tasks WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(pool)
            .await?;
    let progress = compute_progress(&completions);

    sqlx::query("UPDATE projects SET progress = ? WHERE id = ?")
        .bind(progress)
        .bind(project_id)
        .execute(pool)
        .await?;
    debug!(project_id, progress, tasks = completions.len(), "Project progress refreshed");
    Ok(progress)
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = ProjectPayload,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 403, description = "HR, Admin or Chef only")
    ),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ProjectPayload>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    payload.validate()?;

    let chef_id = match payload.chef_id {
        Some(id) if id != auth.employee_id && !auth.is_hr_or_admin() => {
            return Err(ApiError::forbidden("A chef can only create projects they lead"));
        }
        Some(id) => Some(id),
        None if auth.is_hr_or_admin() => None,
        None => Some(auth.employee_id),
    };
    let status = payload.status.unwrap_or(ProjectStatus::Planned);

    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, description, chef_id, start_date, end_date, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(chef_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(status.to_string())
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    info!(project_id = id, by = auth.employee_id, "Project created");
    Ok(HttpResponse::Created().json(fetch_project(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    params(PageQuery),
    responses((status = 200, description = "Paginated project list", body = ProjectListResponse)),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let page = Page::resolve(query.page, query.per_page);

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
        .fetch_one(pool.get_ref())
        .await?;
    let projects = sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id DESC LIMIT ? OFFSET ?"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(page.wrap(projects, total)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project found", body = Project),
        (status = 404, description = "Project not found")
    ),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_project(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(("id" = u64, Path, description = "Project ID")),
    request_body = ProjectPayload,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "Not the project's chef"),
        (status = 404, description = "Project not found")
    ),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ProjectPayload>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let project = fetch_project(pool.get_ref(), id).await?;
    if !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the project's chef or HR/Admin can edit it"));
    }
    payload.validate()?;

    // only HR/Admin may hand a project to another chef
    let chef_id = if auth.is_hr_or_admin() {
        payload.chef_id.or(project.chef_id)
    } else {
        project.chef_id
    };
    let status = payload
        .status
        .map(|s| s.to_string())
        .unwrap_or(project.status);

    sqlx::query(
        r#"
        UPDATE projects
        SET name = ?, description = ?, chef_id = ?, start_date = ?, end_date = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(chef_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(status)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(fetch_project(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project and its tasks deleted"),
        (status = 403, description = "Not the project's chef"),
        (status = 404, description = "Project not found")
    ),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let project = fetch_project(pool.get_ref(), id).await?;
    if !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the project's chef or HR/Admin can delete it"));
    }

    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    info!(project_id = id, by = auth.employee_id, "Project deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/tasks",
    params(("id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Tasks of the project", body = [Task]),
        (status = 404, description = "Project not found")
    ),
    tag = "Project",
    security(("bearer_auth" = []))
)]
pub async fn list_project_tasks(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    fetch_project(pool.get_ref(), id).await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE project_id = ? ORDER BY id",
        crate::api::task::TASK_COLUMNS
    ))
    .bind(id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn user(id: u64, role: Role) -> AuthUser {
        AuthUser {
            employee_id: id,
            email: format!("u{id}@corp.io"),
            role,
        }
    }

    fn project(chef_id: Option<u64>) -> Project {
        Project {
            id: 1,
            name: "Intranet".into(),
            description: None,
            chef_id,
            start_date: None,
            end_date: None,
            status: "active".into(),
            progress: 0,
            created_at: None,
        }
    }

    #[test]
    fn only_the_leading_chef_or_hr_manage_a_project() {
        assert!(can_manage_project(&user(3, Role::Chef), &project(Some(3))));
        assert!(!can_manage_project(&user(4, Role::Chef), &project(Some(3))));
        assert!(can_manage_project(&user(9, Role::Hr), &project(None)));
        assert!(!can_manage_project(&user(5, Role::Employee), &project(Some(3))));
    }

    #[test]
    fn payload_dates_must_be_ordered() {
        let payload = ProjectPayload {
            name: "Audit".into(),
            description: None,
            chef_id: None,
            start_date: NaiveDate::from_ymd_opt(2026, 5, 10),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            status: None,
        };
        assert!(payload.validate().is_err());
    }
}
