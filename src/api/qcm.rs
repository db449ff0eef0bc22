use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::qcm::{
        Qcm, QcmQuestion, QcmQuestionRow, QcmSubmission, score_answers, validate_question,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateQcm {
    #[schema(example = "Safety onboarding")]
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<QcmQuestion>,
}

#[derive(Serialize, ToSchema)]
pub struct QcmDetail {
    #[serde(flatten)]
    pub qcm: Qcm,
    pub questions: Vec<QcmQuestion>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswers {
    /// One entry per question, in order; `null` for a skipped question
    #[schema(example = json!([0, 2, null]))]
    pub answers: Vec<Option<usize>>,
}

async fn fetch_qcm(pool: &MySqlPool, id: u64) -> ApiResult<Qcm> {
    sqlx::query_as::<_, Qcm>(
        "SELECT id, title, description, created_by, created_at FROM qcms WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("QCM not found"))
}

async fn fetch_questions(pool: &MySqlPool, qcm_id: u64) -> Result<Vec<QcmQuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QcmQuestionRow>(
        r#"
        SELECT id, qcm_id, position, prompt, options, correct_index
        FROM qcm_questions WHERE qcm_id = ? ORDER BY position
        "#,
    )
    .bind(qcm_id)
    .fetch_all(pool)
    .await
}

#[utoipa::path(
    post,
    path = "/api/qcms",
    request_body = CreateQcm,
    responses(
        (status = 201, description = "QCM created", body = QcmDetail),
        (status = 400, description = "Invalid question")
    ),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn create_qcm(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateQcm>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let payload = payload.into_inner();
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if payload.questions.is_empty() {
        return Err(ApiError::bad_request("a QCM needs at least one question"));
    }

    let mut keys = Vec::with_capacity(payload.questions.len());
    for (i, q) in payload.questions.iter().enumerate() {
        let key = validate_question(q)
            .map_err(|e| ApiError::bad_request(format!("question {}: {e}", i + 1)))?;
        keys.push(key);
    }

    let mut tx = pool.begin().await?;

    let qcm_id = sqlx::query("INSERT INTO qcms (title, description, created_by) VALUES (?, ?, ?)")
        .bind(payload.title.trim())
        .bind(&payload.description)
        .bind(auth.employee_id)
        .execute(&mut *tx)
        .await?
        .last_insert_id();

    for (position, (question, key)) in payload.questions.iter().zip(&keys).enumerate() {
        let options = serde_json::to_string(&question.options)
            .map_err(|e| ApiError::internal(format!("options serialisation failed: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO qcm_questions (qcm_id, position, prompt, options, correct_index)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(qcm_id)
        .bind(position as i32)
        .bind(question.prompt.trim())
        .bind(options)
        .bind(*key as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(qcm_id, questions = keys.len(), by = auth.employee_id, "QCM created");

    let detail = QcmDetail {
        qcm: fetch_qcm(pool.get_ref(), qcm_id).await?,
        questions: payload.questions,
    };
    Ok(HttpResponse::Created().json(detail))
}

#[utoipa::path(
    get,
    path = "/api/qcms",
    responses((status = 200, description = "All QCMs", body = [Qcm])),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn list_qcms(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let qcms = sqlx::query_as::<_, Qcm>(
        "SELECT id, title, description, created_by, created_at FROM qcms ORDER BY id DESC",
    )
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(qcms))
}

#[utoipa::path(
    get,
    path = "/api/qcms/{id}",
    params(("id" = u64, Path, description = "QCM ID")),
    responses(
        (status = 200, description = "QCM with its questions; answers only for HR/Admin", body = QcmDetail),
        (status = 404, description = "QCM not found")
    ),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn get_qcm(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let qcm = fetch_qcm(pool.get_ref(), path.into_inner()).await?;
    let reveal = auth.is_hr_or_admin();

    let questions = fetch_questions(pool.get_ref(), qcm.id)
        .await?
        .into_iter()
        .map(|row| row.into_question(reveal))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::internal(format!("stored options are corrupt: {e}")))?;

    Ok(HttpResponse::Ok().json(QcmDetail { qcm, questions }))
}

#[utoipa::path(
    delete,
    path = "/api/qcms/{id}",
    params(("id" = u64, Path, description = "QCM ID")),
    responses(
        (status = 200, description = "QCM, questions and submissions deleted"),
        (status = 404, description = "QCM not found")
    ),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn delete_qcm(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let result = sqlx::query("DELETE FROM qcms WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("QCM not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/qcms/{id}/submit",
    params(("id" = u64, Path, description = "QCM ID")),
    request_body = SubmitAnswers,
    responses(
        (status = 201, description = "Answers scored", body = QcmSubmission),
        (status = 400, description = "More answers than questions"),
        (status = 409, description = "Already submitted")
    ),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn submit_qcm(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SubmitAnswers>,
) -> ApiResult<HttpResponse> {
    let qcm = fetch_qcm(pool.get_ref(), path.into_inner()).await?;
    let key: Vec<usize> = fetch_questions(pool.get_ref(), qcm.id)
        .await?
        .iter()
        .map(|row| row.correct_index as usize)
        .collect();

    if payload.answers.len() > key.len() {
        return Err(ApiError::bad_request(format!(
            "{} answers given for {} questions",
            payload.answers.len(),
            key.len()
        )));
    }
    let score = score_answers(&key, &payload.answers);
    let total = key.len() as i32;

    let id = sqlx::query(
        "INSERT INTO qcm_submissions (qcm_id, employee_id, score, total) VALUES (?, ?, ?, ?)",
    )
    .bind(qcm.id)
    .bind(auth.employee_id)
    .bind(score)
    .bind(total)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_constraint_violation(&e) {
            ApiError::conflict("You already submitted this QCM")
        } else {
            e.into()
        }
    })?
    .last_insert_id();

    info!(qcm_id = qcm.id, employee_id = auth.employee_id, score, total, "QCM submitted");

    let submission = sqlx::query_as::<_, QcmSubmission>(
        "SELECT id, qcm_id, employee_id, score, total, submitted_at FROM qcm_submissions WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool.get_ref())
    .await?;
    Ok(HttpResponse::Created().json(submission))
}

#[utoipa::path(
    get,
    path = "/api/qcms/{id}/results",
    params(("id" = u64, Path, description = "QCM ID")),
    responses(
        (status = 200, description = "Every submission for the QCM", body = [QcmSubmission]),
        (status = 403, description = "HR/Admin only")
    ),
    tag = "QCM",
    security(("bearer_auth" = []))
)]
pub async fn qcm_results(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let qcm = fetch_qcm(pool.get_ref(), path.into_inner()).await?;
    let results = sqlx::query_as::<_, QcmSubmission>(
        r#"
        SELECT id, qcm_id, employee_id, score, total, submitted_at
        FROM qcm_submissions WHERE qcm_id = ? ORDER BY score DESC, submitted_at
        "#,
    )
    .bind(qcm.id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(results))
}
