use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        evaluation::{Evaluation, validate_score},
        notification::NotificationKind,
    },
    service::{hierarchy, notifier::Notifier},
    utils::db_utils::{Conditions, bind_values},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const EVALUATION_COLUMNS: &str =
    "id, employee_id, evaluator_id, period, score, comments, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateEvaluation {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = "2026-Q1")]
    pub period: String,
    #[schema(example = 82)]
    pub score: i32,
    pub comments: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEvaluation {
    pub period: Option<String>,
    pub score: Option<i32>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EvaluationFilter {
    pub employee_id: Option<u64>,
}

async fn fetch_evaluation(pool: &MySqlPool, id: u64) -> ApiResult<Evaluation> {
    sqlx::query_as::<_, Evaluation>(&format!(
        "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Evaluation not found"))
}

#[utoipa::path(
    post,
    path = "/api/evaluations",
    request_body = CreateEvaluation,
    responses(
        (status = 201, description = "Evaluation recorded", body = Evaluation),
        (status = 400, description = "Score out of range"),
        (status = 403, description = "Not the employee's chef or HR/Admin")
    ),
    tag = "Evaluation",
    security(("bearer_auth" = []))
)]
pub async fn create_evaluation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    payload: web::Json<CreateEvaluation>,
) -> ApiResult<HttpResponse> {
    hierarchy::ensure_manages(pool.get_ref(), &auth, payload.employee_id).await?;
    validate_score(payload.score).map_err(ApiError::bad_request)?;
    let period = payload.period.trim();
    if period.is_empty() {
        return Err(ApiError::bad_request("period is required"));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO evaluations (employee_id, evaluator_id, period, score, comments)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(auth.employee_id)
    .bind(period)
    .bind(payload.score)
    .bind(&payload.comments)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(evaluation_id = id, employee_id = payload.employee_id, by = auth.employee_id, "Evaluation created");
    notifier
        .notify(
            payload.employee_id,
            NotificationKind::EvaluationPublished,
            "New evaluation",
            &format!("Your evaluation for {period} has been published."),
        )
        .await;

    Ok(HttpResponse::Created().json(fetch_evaluation(pool.get_ref(), id).await?))
}

// chef rights come from the reporting line, not the role label
fn visible_evaluations(auth: &AuthUser) -> Conditions {
    let mut conditions = Conditions::new();
    if !auth.is_hr_or_admin() {
        conditions.push(
            "(employee_id = ? OR evaluator_id = ? OR employee_id IN (SELECT id FROM employees WHERE chef_id = ?))",
            [auth.employee_id, auth.employee_id, auth.employee_id],
        );
    }
    conditions
}

#[utoipa::path(
    get,
    path = "/api/evaluations",
    params(EvaluationFilter),
    responses((status = 200, description = "Visible evaluations", body = [Evaluation])),
    tag = "Evaluation",
    security(("bearer_auth" = []))
)]
pub async fn list_evaluations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EvaluationFilter>,
) -> ApiResult<HttpResponse> {
    let mut conditions = visible_evaluations(&auth);
    if let Some(employee_id) = query.employee_id {
        conditions.push("employee_id = ?", [employee_id]);
    }

    let sql = format!(
        "SELECT {EVALUATION_COLUMNS} FROM evaluations{} ORDER BY created_at DESC, id DESC",
        conditions.where_sql()
    );
    let evaluations = bind_values!(sqlx::query_as::<_, Evaluation>(&sql), conditions.values())
        .fetch_all(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(evaluations))
}

#[utoipa::path(
    get,
    path = "/api/evaluations/{id}",
    params(("id" = u64, Path, description = "Evaluation ID")),
    responses(
        (status = 200, description = "Evaluation found", body = Evaluation),
        (status = 404, description = "Evaluation not found")
    ),
    tag = "Evaluation",
    security(("bearer_auth" = []))
)]
pub async fn get_evaluation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let evaluation = fetch_evaluation(pool.get_ref(), path.into_inner()).await?;
    hierarchy::ensure_can_view(pool.get_ref(), &auth, evaluation.employee_id).await?;
    Ok(HttpResponse::Ok().json(evaluation))
}

#[utoipa::path(
    put,
    path = "/api/evaluations/{id}",
    params(("id" = u64, Path, description = "Evaluation ID")),
    request_body = UpdateEvaluation,
    responses(
        (status = 200, description = "Evaluation updated", body = Evaluation),
        (status = 403, description = "Only the evaluator or HR/Admin")
    ),
    tag = "Evaluation",
    security(("bearer_auth" = []))
)]
pub async fn update_evaluation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEvaluation>,
) -> ApiResult<HttpResponse> {
    let evaluation = fetch_evaluation(pool.get_ref(), path.into_inner()).await?;
    if evaluation.evaluator_id != auth.employee_id && !auth.is_hr_or_admin() {
        return Err(ApiError::forbidden("Only the evaluator or HR/Admin can edit an evaluation"));
    }

    let score = payload.score.unwrap_or(evaluation.score);
    validate_score(score).map_err(ApiError::bad_request)?;
    let period = payload.period.as_deref().map(str::trim).unwrap_or(&evaluation.period);
    if period.is_empty() {
        return Err(ApiError::bad_request("period must not be empty"));
    }

    sqlx::query("UPDATE evaluations SET period = ?, score = ?, comments = ? WHERE id = ?")
        .bind(period)
        .bind(score)
        .bind(payload.comments.as_ref().or(evaluation.comments.as_ref()))
        .bind(evaluation.id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(fetch_evaluation(pool.get_ref(), evaluation.id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/evaluations/{id}",
    params(("id" = u64, Path, description = "Evaluation ID")),
    responses(
        (status = 200, description = "Evaluation deleted"),
        (status = 404, description = "Evaluation not found")
    ),
    tag = "Evaluation",
    security(("bearer_auth" = []))
)]
pub async fn delete_evaluation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let evaluation = fetch_evaluation(pool.get_ref(), path.into_inner()).await?;
    if evaluation.evaluator_id != auth.employee_id && !auth.is_hr_or_admin() {
        return Err(ApiError::forbidden("Only the evaluator or HR/Admin can delete an evaluation"));
    }

    sqlx::query("DELETE FROM evaluations WHERE id = ?")
        .bind(evaluation.id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            employee_id: 6,
            email: "chef@example.com".into(),
            role,
        }
    }

    #[test]
    fn subordinates_evaluations_are_visible_to_any_chef() {
        let scope = visible_evaluations(&caller(Role::Employee));
        assert!(scope.where_sql().contains("SELECT id FROM employees WHERE chef_id = ?"));
        assert_eq!(scope.values().len(), 3);

        assert_eq!(visible_evaluations(&caller(Role::Admin)).where_sql(), "");
    }
}
