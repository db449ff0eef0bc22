use crate::{
    api::employee::fetch_employee,
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, validate_password_policy, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        employee::{Employee, EmployeeStatus},
        role::Role,
    },
    models::{ChangePasswordDto, Claims, CredentialRow, LoginReqDto, TokenPair, TokenType},
    utils::email_filter,
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, error, info, instrument};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::Unauthorized(message.to_string())
}

async fn credentials_by_email(pool: &MySqlPool, email: &str) -> Result<Option<CredentialRow>, sqlx::Error> {
    sqlx::query_as::<_, CredentialRow>(
        "SELECT id, email, password, role, status FROM employees WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

async fn credentials_by_id(pool: &MySqlPool, id: u64) -> Result<Option<CredentialRow>, sqlx::Error> {
    sqlx::query_as::<_, CredentialRow>(
        "SELECT id, email, password, role, status FROM employees WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

fn is_active(row: &CredentialRow) -> bool {
    matches!(EmployeeStatus::from_str(&row.status), Ok(EmployeeStatus::Active))
}

fn role_of(row: &CredentialRow) -> ApiResult<Role> {
    Role::from_str(&row.role)
        .map_err(|_| ApiError::internal(format!("employee {} has unknown role {}", row.id, row.role)))
}

/// Signs an access/refresh pair and records the refresh `jti`.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    employee_id: u64,
    email: &str,
    role: Role,
) -> ApiResult<TokenPair> {
    let access_token = generate_access_token(
        employee_id,
        email.to_string(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| ApiError::internal(format!("access token signing failed: {e}")))?;

    let (refresh_token, refresh_claims): (String, Claims) = generate_refresh_token(
        employee_id,
        email.to_string(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(|e| ApiError::internal(format!("refresh token signing failed: {e}")))?;

    debug!(employee_id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (employee_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(employee_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials", body = Object, example = json!({
            "message": "Invalid credentials"
        })),
        (status = 403, description = "Account is not active")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    // 1. Basic validation
    let email = email_filter::normalize(&user.email);
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(ApiError::bad_request("Email and password are required"));
    }

    // 2. Fetch credentials
    let Some(row) = credentials_by_email(pool.get_ref(), &email).await? else {
        info!("Invalid credentials: unknown email");
        return Err(unauthorized("Invalid credentials"));
    };

    // 3. Verify password
    if let Err(e) = verify_password(&user.password, &row.password) {
        info!(error = %e, employee_id = row.id, "Invalid credentials: password mismatch");
        return Err(unauthorized("Invalid credentials"));
    }
    if !is_active(&row) {
        info!(employee_id = row.id, status = %row.status, "Login refused for inactive account");
        return Err(ApiError::forbidden("Account is not active"));
    }

    // 4. Tokens
    let role = role_of(&row)?;
    let tokens = issue_tokens(pool.get_ref(), &config, row.id, &row.email, role).await?;

    // 5. Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE employees SET last_login_at = NOW() WHERE id = ?")
        .bind(row.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(employee_id = row.id, %role, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotates a refresh token: the presented one is revoked, a new pair is issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, revoked or non-refresh token")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let token = bearer(&req).ok_or_else(|| unauthorized("Missing token"))?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized("Invalid token"))?;

    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized("Refresh token required"));
    }

    let mut tx = pool.begin().await?;

    // find refresh token in DB
    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        "SELECT id, employee_id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE",
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let (record_id, employee_id) = match record {
        Some((id, employee_id, false)) => (id, employee_id),
        Some((_, employee_id, true)) => {
            info!(employee_id, jti = %claims.jti, "Revoked refresh token presented");
            return Err(unauthorized("Token revoked"));
        }
        None => return Err(unauthorized("Unknown token")),
    };

    // revoke old refresh token
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    // role or status may have changed since the token was issued
    let row = credentials_by_id(pool.get_ref(), employee_id)
        .await?
        .ok_or_else(|| unauthorized("Account no longer exists"))?;
    if !is_active(&row) {
        return Err(ApiError::forbidden("Account is not active"));
    }

    let tokens = issue_tokens(pool.get_ref(), &config, row.id, &row.email, role_of(&row)?).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The caller's employee profile", body = Employee),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let employee = fetch_employee(pool.get_ref(), auth.employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

#[utoipa::path(
    put,
    path = "/api/me/password",
    request_body = ChangePasswordDto,
    responses(
        (status = 200, description = "Password changed, other sessions revoked"),
        (status = 400, description = "New password rejected by policy"),
        (status = 401, description = "Current password is wrong")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ChangePasswordDto>,
) -> ApiResult<HttpResponse> {
    let row = credentials_by_id(pool.get_ref(), auth.employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    if verify_password(&payload.current_password, &row.password).is_err() {
        return Err(unauthorized("Current password is incorrect"));
    }
    validate_password_policy(&payload.new_password).map_err(ApiError::bad_request)?;
    if payload.new_password == payload.current_password {
        return Err(ApiError::bad_request("New password must differ from the current one"));
    }

    let hashed = hash_password(&payload.new_password)
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE employees SET password = ? WHERE id = ?")
        .bind(hashed)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE employee_id = ? AND revoked = FALSE")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(employee_id = row.id, "Password changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed" })))
}
