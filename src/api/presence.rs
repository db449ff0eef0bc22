use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_constraint_violation},
    model::presence::Presence,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PresenceFilter {
    /// Only honoured for HR/Admin; others always get their own records
    pub employee_id: Option<u64>,
    #[param(value_type = Option<String>, format = Date)]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub to: Option<NaiveDate>,
}

async fn todays_presence(pool: &MySqlPool, employee_id: u64) -> ApiResult<Presence> {
    sqlx::query_as::<_, Presence>(
        r#"
        SELECT id, employee_id, date, check_in, check_out
        FROM presences WHERE employee_id = ? AND date = CURDATE()
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("No presence recorded today"))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/presence/check-in",
    responses(
        (status = 201, description = "Checked in successfully", body = Presence),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn check_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    sqlx::query(
        r#"
        INSERT INTO presences (employee_id, date, check_in)
        VALUES (?, CURDATE(), CURTIME())
        "#,
    )
    .bind(auth.employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        // Duplicate check-in for same day
        if is_constraint_violation(&e) {
            ApiError::conflict("Already checked in today")
        } else {
            e.into()
        }
    })?;

    let presence = todays_presence(pool.get_ref(), auth.employee_id).await?;
    Ok(HttpResponse::Created().json(presence))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/presence/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Presence),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn check_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let result = sqlx::query(
        r#"
        UPDATE presences
        SET check_out = CURTIME()
        WHERE employee_id = ?
        AND date = CURDATE()
        AND check_out IS NULL
        "#,
    )
    .bind(auth.employee_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::bad_request("No active check-in found for today"));
    }

    let presence = todays_presence(pool.get_ref(), auth.employee_id).await?;
    Ok(HttpResponse::Ok().json(presence))
}

#[utoipa::path(
    get,
    path = "/api/presence",
    params(PresenceFilter),
    responses(
        (status = 200, description = "Presence records, newest first", body = [Presence]),
        (status = 400, description = "from is after to")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn list_presence(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PresenceFilter>,
) -> ApiResult<HttpResponse> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::bad_request("from must not be after to"));
        }
    }

    let employee_id = if auth.is_hr_or_admin() {
        query.employee_id
    } else {
        Some(auth.employee_id)
    };

    let presences = sqlx::query_as::<_, Presence>(
        r#"
        SELECT id, employee_id, date, check_in, check_out
        FROM presences
        WHERE (? IS NULL OR employee_id = ?)
        AND (? IS NULL OR date >= ?)
        AND (? IS NULL OR date <= ?)
        ORDER BY date DESC, employee_id
        "#,
    )
    .bind(employee_id)
    .bind(employee_id)
    .bind(query.from)
    .bind(query.from)
    .bind(query.to)
    .bind(query.to)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(presences))
}
