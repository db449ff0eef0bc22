use crate::{
    api::project::{can_manage_project, fetch_project, refresh_progress},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::{
        notification::NotificationKind,
        task::{Task, TaskStatus, normalize_progress, progress_update},
    },
    service::notifier::Notifier,
    utils::db_utils::{SqlUpdate, nullable},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

pub const TASK_COLUMNS: &str =
    "id, project_id, assignee_id, title, description, status, completion, due_date, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateTask {
    #[schema(example = 1)]
    pub project_id: u64,
    pub assignee_id: Option<u64>,
    #[schema(example = "Draft the migration plan")]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    #[schema(example = 0)]
    pub completion: Option<i32>,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
}

/// Partial update; `null` clears the assignee, description or due date.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTask {
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u64>)]
    pub assignee_id: Option<Option<u64>>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl UpdateTask {
    fn to_update(&self) -> SqlUpdate {
        let mut update = SqlUpdate::new("tasks");
        update
            .set("assignee_id", self.assignee_id)
            .set("title", self.title.as_deref().map(str::trim))
            .set("description", self.description.clone())
            .set("due_date", self.due_date);
        update
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TaskProgress {
    pub status: Option<TaskStatus>,
    #[schema(example = 60)]
    pub completion: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskFilter {
    pub project_id: Option<u64>,
    pub assignee_id: Option<u64>,
    pub status: Option<TaskStatus>,
}

async fn fetch_task(pool: &MySqlPool, id: u64) -> ApiResult<Task> {
    sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

fn unknown_assignee(e: sqlx::Error) -> ApiError {
    if is_constraint_violation(&e) {
        ApiError::bad_request("assignee_id does not reference an employee")
    } else {
        e.into()
    }
}

async fn notify_assignee(notifier: &Notifier, task: &Task) {
    if let Some(assignee) = task.assignee_id {
        let message = format!("You have been assigned the task \"{}\".", task.title);
        notifier
            .notify(assignee, NotificationKind::TaskAssigned, "New task assigned", &message)
            .await;
    }
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created, project progress refreshed", body = Task),
        (status = 403, description = "Not the project's chef"),
        (status = 404, description = "Project not found")
    ),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    payload: web::Json<CreateTask>,
) -> ApiResult<HttpResponse> {
    let project = fetch_project(pool.get_ref(), payload.project_id).await?;
    if !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the project's chef or HR/Admin can add tasks"));
    }
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    let (status, completion) =
        normalize_progress(payload.status, payload.completion).map_err(ApiError::bad_request)?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (project_id, assignee_id, title, description, status, completion, due_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project.id)
    .bind(payload.assignee_id)
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(status.to_string())
    .bind(completion)
    .bind(payload.due_date)
    .execute(pool.get_ref())
    .await
    .map_err(unknown_assignee)?;

    refresh_progress(pool.get_ref(), project.id).await?;

    let task = fetch_task(pool.get_ref(), result.last_insert_id()).await?;
    notify_assignee(&notifier, &task).await;
    info!(task_id = task.id, project_id = project.id, "Task created");
    Ok(HttpResponse::Created().json(task))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskFilter),
    responses((status = 200, description = "Tasks matching the filter", body = [Task])),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskFilter>,
) -> ApiResult<HttpResponse> {
    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
    let mut ids: Vec<u64> = Vec::new();

    // plain employees only see what is assigned to them
    let assignee = if auth.role.can_manage() {
        query.assignee_id
    } else {
        Some(auth.employee_id)
    };
    if let Some(project_id) = query.project_id {
        sql.push_str(" AND project_id = ?");
        ids.push(project_id);
    }
    if let Some(assignee_id) = assignee {
        sql.push_str(" AND assignee_id = ?");
        ids.push(assignee_id);
    }
    if query.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY due_date IS NULL, due_date, id");

    let mut q = sqlx::query_as::<_, Task>(&sql);
    for id in ids {
        q = q.bind(id);
    }
    if let Some(status) = query.status {
        q = q.bind(status.to_string());
    }
    let tasks = q.fetch_all(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 404, description = "Task not found")
    ),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;
    if !auth.role.can_manage() && task.assignee_id != Some(auth.employee_id) {
        return Err(ApiError::forbidden("Not allowed to view this task"));
    }
    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task ID")),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 403, description = "Not the project's chef"),
        (status = 404, description = "Task not found")
    ),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTask>,
) -> ApiResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;
    let project = fetch_project(pool.get_ref(), task.project_id).await?;
    if !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the project's chef or HR/Admin can edit tasks"));
    }

    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    let update = payload.to_update();
    if update.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }
    update
        .execute(pool.get_ref(), task.id)
        .await
        .map_err(unknown_assignee)?;

    refresh_progress(pool.get_ref(), task.project_id).await?;

    let updated = fetch_task(pool.get_ref(), task.id).await?;
    if updated.assignee_id != task.assignee_id {
        notify_assignee(&notifier, &updated).await;
    }
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}/progress",
    params(("id" = u64, Path, description = "Task ID")),
    request_body = TaskProgress,
    responses(
        (status = 200, description = "Progress stored, project progress refreshed", body = Task),
        (status = 400, description = "Completion outside 0..=100"),
        (status = 403, description = "Not the assignee or the project's chef")
    ),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn update_task_progress(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<TaskProgress>,
) -> ApiResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;
    let project = fetch_project(pool.get_ref(), task.project_id).await?;
    if task.assignee_id != Some(auth.employee_id) && !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the assignee or the project's chef can report progress"));
    }

    let (status, completion) = progress_update(task.completion, payload.status, payload.completion)
        .map_err(ApiError::bad_request)?;

    sqlx::query("UPDATE tasks SET status = ?, completion = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(completion)
        .bind(task.id)
        .execute(pool.get_ref())
        .await?;

    let progress = refresh_progress(pool.get_ref(), task.project_id).await?;
    info!(task_id = task.id, %status, completion, project_progress = progress, "Task progress updated");

    Ok(HttpResponse::Ok().json(fetch_task(pool.get_ref(), task.id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 403, description = "Not the project's chef"),
        (status = 404, description = "Task not found")
    ),
    tag = "Task",
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;
    let project = fetch_project(pool.get_ref(), task.project_id).await?;
    if !can_manage_project(&auth, &project) {
        return Err(ApiError::forbidden("Only the project's chef or HR/Admin can delete tasks"));
    }

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task.id)
        .execute(pool.get_ref())
        .await?;
    refresh_progress(pool.get_ref(), task.project_id).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    #[test]
    fn null_clears_and_absent_keeps() {
        let patch: UpdateTask =
            serde_json::from_value(json!({"assignee_id": null, "description": null})).unwrap();
        let (sql, values) = patch.to_update().build(8);
        assert_eq!(sql, "UPDATE tasks SET assignee_id = ?, description = ? WHERE id = ?");
        assert_eq!(values, vec![SqlValue::Null, SqlValue::Null, SqlValue::U64(8)]);

        let patch: UpdateTask = serde_json::from_value(json!({"title": " Ship it "})).unwrap();
        let (sql, values) = patch.to_update().build(8);
        assert_eq!(sql, "UPDATE tasks SET title = ? WHERE id = ?");
        assert_eq!(values[0], SqlValue::Str("Ship it".into()));
    }

    #[test]
    fn empty_patch_has_nothing_to_set() {
        assert!(UpdateTask::default().to_update().is_empty());
    }
}
