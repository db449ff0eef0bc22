use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{ApiError, ApiResult, is_constraint_violation};
use crate::model::conge::{Conge, CongeDocument, Decision, LeaveStatus, LeaveType};
use crate::service::conge_workflow::{self, CONGE_COLUMNS, LeaveDraft};
use crate::service::notifier::Notifier;
use crate::service::uploads::{self, SavedFile};
use crate::utils::db_utils::{Conditions, bind_values};
use crate::utils::pagination::Page;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::path::Path;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateConge {
    #[schema(example = "annual")]
    pub leave_type: LeaveType,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub start_date: chrono::NaiveDate,
    #[schema(example = "2026-03-06", format = "date", value_type = String)]
    pub end_date: chrono::NaiveDate,
    #[schema(example = "Family trip")]
    pub reason: Option<String>,
    /// Forces medical handling for a non-sick leave type
    pub is_medical: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateConge {
    pub leave_type: Option<LeaveType>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<chrono::NaiveDate>,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<chrono::NaiveDate>,
    pub reason: Option<String>,
    pub is_medical: Option<bool>,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct DecisionBody {
    #[schema(example = "Enjoy your holidays")]
    pub comment: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct CongeFilter {
    /// Filter by employee ID
    #[schema(example = 12)]
    pub employee_id: Option<u64>,
    /// pending, approved or rejected
    #[schema(example = "pending")]
    pub status: Option<String>,
    #[schema(example = "annual")]
    pub leave_type: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct CongeListResponse {
    pub data: Vec<Conge>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Serialize)]
struct CongeDetail {
    #[serde(flatten)]
    conge: Conge,
    documents: Vec<CongeDocument>,
}

/// HR/Admin see everything, anyone else their own requests and those routed to them.
fn visible_conges(auth: &AuthUser) -> Conditions {
    let mut conditions = Conditions::new();
    if !auth.is_hr_or_admin() {
        conditions.push("(employee_id = ? OR chef_id = ?)", [auth.employee_id, auth.employee_id]);
    }
    conditions
}

/// Draft of an amended request. Flags are re-derived when the type changes,
/// a stored medical override survives only while the type stays the same.
fn amend_draft(current: &Conge, payload: &UpdateConge) -> ApiResult<LeaveDraft> {
    let stored_type = LeaveType::from_str(&current.leave_type)
        .map_err(|_| ApiError::internal(format!("stored leave type {}", current.leave_type)))?;
    let leave_type = payload.leave_type.unwrap_or(stored_type);
    let medical_override = match payload.is_medical {
        Some(flag) => Some(flag),
        None if leave_type == stored_type => Some(current.is_medical),
        None => None,
    };
    LeaveDraft::new(
        leave_type,
        payload.start_date.unwrap_or(current.start_date),
        payload.end_date.unwrap_or(current.end_date),
        medical_override,
    )
}

/* =========================
Submit leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/conges",
    request_body(content = CreateConge, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = Conge),
        (status = 400, description = "Invalid dates or insufficient balance"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn create_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    payload: web::Json<CreateConge>,
) -> ApiResult<HttpResponse> {
    let draft = LeaveDraft::new(
        payload.leave_type,
        payload.start_date,
        payload.end_date,
        payload.is_medical,
    )?;

    let conge = conge_workflow::submit(
        pool.get_ref(),
        auth.employee_id,
        &draft,
        payload.reason.as_deref(),
        config.default_leave_days,
    )
    .await?;

    tracing::info!(leave_id = conge.id, employee_id = auth.employee_id, days = conge.number_of_days, "Leave request submitted");
    notifier.leave_submitted(&conge).await;

    Ok(HttpResponse::Created().json(conge))
}

/* =========================
List leave requests
========================= */
#[utoipa::path(
    get,
    path = "/api/conges",
    params(CongeFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = CongeListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn list_conges(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CongeFilter>,
) -> ApiResult<HttpResponse> {
    let page = Page::resolve(query.page, query.per_page);

    let mut conditions = visible_conges(&auth);

    if let Some(emp_id) = query.employee_id {
        conditions.push("employee_id = ?", [emp_id]);
    }

    if let Some(status) = query.status.as_deref() {
        let status = LeaveStatus::from_str(status)
            .map_err(|_| ApiError::bad_request("status must be pending, approved or rejected"))?;
        conditions.push("status = ?", [status.to_string()]);
    }

    if let Some(leave_type) = query.leave_type.as_deref() {
        let leave_type = LeaveType::from_str(leave_type)
            .map_err(|_| ApiError::bad_request("Unknown leave type"))?;
        conditions.push("leave_type = ?", [leave_type.to_string()]);
    }

    let where_sql = conditions.where_sql();
    let count_sql = format!("SELECT COUNT(*) FROM conges{where_sql}");
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {CONGE_COLUMNS} FROM conges{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    );
    let conges = bind_values!(sqlx::query_as::<_, Conge>(&data_sql), conditions.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(CongeListResponse {
        data: conges,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/conges/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request with its documents", body = Conge),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn get_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let conge = conge_workflow::find(pool.get_ref(), path.into_inner()).await?;
    if !conge_workflow::can_view(&auth, &conge) {
        return Err(ApiError::forbidden("Not allowed to view this leave request"));
    }
    let documents = conge_workflow::documents(pool.get_ref(), conge.id).await?;
    Ok(HttpResponse::Ok().json(CongeDetail { conge, documents }))
}

#[utoipa::path(
    put,
    path = "/api/conges/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    request_body = UpdateConge,
    responses(
        (status = 200, description = "Leave request updated", body = Conge),
        (status = 403, description = "Not the requester or no longer pending"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn update_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<UpdateConge>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let current = conge_workflow::find(pool.get_ref(), id).await?;
    if !conge_workflow::can_edit(&auth, &current) {
        return Err(ApiError::forbidden(
            "Only the requester can modify a pending leave request",
        ));
    }

    let draft = amend_draft(&current, &payload)?;

    let conge = conge_workflow::amend(
        pool.get_ref(),
        &auth,
        id,
        &draft,
        payload.reason.as_deref(),
        config.default_leave_days,
    )
    .await?;

    Ok(HttpResponse::Ok().json(conge))
}

async fn decide(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    id: u64,
    decision: Decision,
    body: Option<web::Json<DecisionBody>>,
) -> ApiResult<HttpResponse> {
    let comment = body.and_then(|b| b.into_inner().comment);
    let conge = conge_workflow::decide(
        pool.get_ref(),
        &auth,
        id,
        decision,
        comment.as_deref(),
        config.default_leave_days,
    )
    .await?;

    // Best-effort: the decision is already committed
    notifier.leave_decided(&conge).await;

    Ok(HttpResponse::Ok().json(conge))
}

/* =========================
Approve leave (chef / HR / Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/conges/{id}/approve",
    params(("id" = u64, Path, description = "ID of the leave request to approve")),
    request_body = DecisionBody,
    responses(
        (status = 200, description = "Leave approved, balance debited", body = Conge),
        (status = 403, description = "Not the employee's chef nor HR/Admin"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Already decided or insufficient balance", body = Object, example = json!({
            "message": "Leave request is already approved"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn approve_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> ApiResult<HttpResponse> {
    decide(auth, pool, config, notifier, path.into_inner(), Decision::Approve, body).await
}

/* =========================
Reject leave (chef / HR / Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/conges/{id}/reject",
    params(("id" = u64, Path, description = "ID of the leave request to reject")),
    request_body = DecisionBody,
    responses(
        (status = 200, description = "Leave rejected, balance credited back if it was approved", body = Conge),
        (status = 403, description = "Not the employee's chef nor HR/Admin"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Already rejected")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn reject_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> ApiResult<HttpResponse> {
    decide(auth, pool, config, notifier, path.into_inner(), Decision::Reject, body).await
}

#[utoipa::path(
    delete,
    path = "/api/conges/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Deleted; an approved request is credited back", body = Object, example = json!({
            "message": "Leave request deleted"
        })),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn delete_conge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let (conge, docs) = conge_workflow::remove(
        pool.get_ref(),
        &auth,
        path.into_inner(),
        config.default_leave_days,
    )
    .await?;

    uploads::remove_files(
        Path::new(&config.upload_dir),
        docs.into_iter().map(|d| d.stored_name).collect(),
    )
    .await;
    if auth.employee_id == conge.employee_id {
        notifier.leave_cancelled(&conge).await;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Leave request deleted" })))
}

/// Inserts every document row or none of them.
async fn record_documents(pool: &MySqlPool, conge_id: u64, saved: &[SavedFile]) -> ApiResult<()> {
    let mut tx = pool.begin().await?;
    for file in saved {
        sqlx::query(
            r#"
            INSERT INTO conge_documents (conge_id, original_name, stored_name, content_type, size_bytes)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(conge_id)
        .bind(&file.original_name)
        .bind(&file.stored_name)
        .bind(&file.content_type)
        .bind(file.size_bytes)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::not_found("Leave request not found")
            } else {
                e.into()
            }
        })?;
    }
    tx.commit().await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/conges/{id}/documents",
    params(("id" = u64, Path, description = "Leave request ID")),
    request_body(content = String, description = "multipart/form-data with one or more files", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Documents stored", body = [CongeDocument]),
        (status = 400, description = "Rejected file type, size or count"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn upload_documents(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let conge = conge_workflow::find(pool.get_ref(), path.into_inner()).await?;
    if !auth.is_self_or_hr(conge.employee_id) {
        return Err(ApiError::forbidden(
            "Only the requester or HR/Admin can attach documents",
        ));
    }

    let dir = Path::new(&config.upload_dir);
    let saved = uploads::save_multipart(payload, dir, config.max_upload_bytes).await?;

    if let Err(e) = record_documents(pool.get_ref(), conge.id, &saved).await {
        uploads::remove_files(dir, saved.into_iter().map(|f| f.stored_name).collect()).await;
        return Err(e);
    }
    tracing::info!(leave_id = conge.id, files = saved.len(), "Leave documents uploaded");

    let documents = conge_workflow::documents(pool.get_ref(), conge.id).await?;
    Ok(HttpResponse::Created().json(documents))
}

#[utoipa::path(
    get,
    path = "/api/conges/{id}/documents",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Documents of the request", body = [CongeDocument]),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Conge"
)]
pub async fn list_documents(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let conge = conge_workflow::find(pool.get_ref(), path.into_inner()).await?;
    if !conge_workflow::can_view(&auth, &conge) {
        return Err(ApiError::forbidden("Not allowed to view this leave request"));
    }
    let documents = conge_workflow::documents(pool.get_ref(), conge.id).await?;
    Ok(HttpResponse::Ok().json(documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use chrono::NaiveDate;

    fn stored(leave_type: LeaveType, is_medical: bool) -> Conge {
        let (_, deduct) = crate::model::conge::derive_flags(leave_type, Some(is_medical));
        Conge {
            id: 4,
            employee_id: 10,
            chef_id: Some(3),
            leave_type: leave_type.to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            number_of_days: 3,
            reason: None,
            status: LeaveStatus::Pending.to_string(),
            is_medical,
            deduct_from_balance: deduct,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
            created_at: None,
        }
    }

    fn patch(leave_type: Option<LeaveType>, is_medical: Option<bool>) -> UpdateConge {
        UpdateConge {
            leave_type,
            start_date: None,
            end_date: None,
            reason: None,
            is_medical,
        }
    }

    fn caller(employee_id: u64, role: Role) -> AuthUser {
        AuthUser {
            employee_id,
            email: "someone@example.com".into(),
            role,
        }
    }

    #[test]
    fn requests_routed_to_a_chef_are_listed_whatever_the_role() {
        use crate::utils::db_utils::SqlValue;

        let scope = visible_conges(&caller(3, Role::Employee));
        assert_eq!(scope.where_sql(), " WHERE (employee_id = ? OR chef_id = ?)");
        assert_eq!(scope.values(), &[SqlValue::U64(3), SqlValue::U64(3)]);

        assert_eq!(visible_conges(&caller(1, Role::Hr)).where_sql(), "");
    }

    #[test]
    fn sick_amended_to_annual_deducts_again() {
        let draft = amend_draft(&stored(LeaveType::Sick, true), &patch(Some(LeaveType::Annual), None)).unwrap();
        assert_eq!(draft.leave_type, LeaveType::Annual);
        assert!(!draft.is_medical);
        assert!(draft.deduct_from_balance);
    }

    #[test]
    fn annual_amended_to_sick_becomes_medical() {
        let draft = amend_draft(&stored(LeaveType::Annual, false), &patch(Some(LeaveType::Sick), None)).unwrap();
        assert!(draft.is_medical);
        assert!(!draft.deduct_from_balance);
    }

    #[test]
    fn explicit_medical_flag_is_kept_or_replaced() {
        let overridden = stored(LeaveType::Exceptional, true);

        let dates_only = UpdateConge {
            end_date: Some(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()),
            ..patch(None, None)
        };
        let draft = amend_draft(&overridden, &dates_only).unwrap();
        assert_eq!(draft.number_of_days, 5);
        assert!(draft.is_medical);
        assert!(!draft.deduct_from_balance);

        let cleared = amend_draft(&overridden, &patch(None, Some(false))).unwrap();
        assert!(!cleared.is_medical);
        assert!(cleared.deduct_from_balance);

        let forced = amend_draft(&stored(LeaveType::Annual, false), &patch(None, Some(true))).unwrap();
        assert!(forced.is_medical);
        assert!(!forced.deduct_from_balance);
    }

    #[test]
    fn sick_leave_stays_medical_whatever_the_flag() {
        let draft = amend_draft(&stored(LeaveType::Sick, true), &patch(None, Some(false))).unwrap();
        assert!(draft.is_medical);
    }
}
