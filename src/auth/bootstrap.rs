use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::MySqlPool;
use tracing::info;

use crate::{
    auth::password::{hash_password, validate_password_policy},
    config::Config,
    model::role::Role,
    service::ledger,
    utils::email_filter,
};

/// Creates the first admin account when no admin exists yet.
pub async fn ensure_admin(pool: &MySqlPool, config: &Config) -> Result<()> {
    let Some((email, password)) = config.bootstrap_admin.as_ref() else {
        return Ok(());
    };

    let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE role = ?")
        .bind(Role::Admin.to_string())
        .fetch_one(pool)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    validate_password_policy(password)
        .map_err(|e| anyhow::anyhow!("BOOTSTRAP_ADMIN_PASSWORD rejected: {e}"))?;
    let hashed = hash_password(password)
        .map_err(|e| anyhow::anyhow!("failed to hash bootstrap password: {e}"))?;
    let email = email_filter::normalize(email);

    let id = sqlx::query(
        r#"
        INSERT INTO employees (employee_code, first_name, last_name, email, password, role, hire_date)
        VALUES ('ADMIN-0001', 'System', 'Administrator', ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(hashed)
    .bind(Role::Admin.to_string())
    .bind(Utc::now().date_naive())
    .execute(pool)
    .await
    .context("failed to insert bootstrap admin")?
    .last_insert_id();

    ledger::initialise(pool, id, config.default_leave_days)
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialise admin leave balance: {e}"))?;
    email_filter::insert(&email);

    info!(employee_id = id, %email, "Bootstrap admin created");
    Ok(())
}
