use sqlx::{MySqlConnection, MySqlPool};

use crate::error::{ApiError, ApiResult};
use crate::model::leave_balance::{LeaveBalance, LeaveHistoryEntry, LedgerEffect, LedgerEntry};

const BALANCE_COLUMNS: &str =
    "employee_id, total_days, used_days, remaining_days, medical_days, updated_at";

/// Creates the balance at `default_days` if the employee has none yet.
async fn ensure_exists(
    conn: &mut MySqlConnection,
    employee_id: u64,
    default_days: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT IGNORE INTO leave_balances
            (employee_id, total_days, used_days, remaining_days, medical_days)
        VALUES (?, ?, 0, ?, 0)
        "#,
    )
    .bind(employee_id)
    .bind(default_days)
    .bind(default_days)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch(
    conn: &mut MySqlConnection,
    employee_id: u64,
    for_update: bool,
) -> ApiResult<LeaveBalance> {
    let sql = format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances WHERE employee_id = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );

    sqlx::query_as::<_, LeaveBalance>(&sql)
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

pub async fn get_or_create(
    pool: &MySqlPool,
    employee_id: u64,
    default_days: i32,
) -> ApiResult<LeaveBalance> {
    let mut conn = pool.acquire().await?;
    ensure_exists(&mut conn, employee_id, default_days).await?;
    fetch(&mut conn, employee_id, false).await
}

/// Same as `get_or_create` but holds a row lock until the surrounding transaction ends.
pub async fn lock_or_create(
    conn: &mut MySqlConnection,
    employee_id: u64,
    default_days: i32,
) -> ApiResult<LeaveBalance> {
    ensure_exists(conn, employee_id, default_days).await?;
    fetch(conn, employee_id, true).await
}

async fn save(conn: &mut MySqlConnection, balance: &LeaveBalance) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE leave_balances
        SET total_days = ?, used_days = ?, remaining_days = ?, medical_days = ?
        WHERE employee_id = ?
        "#,
    )
    .bind(balance.total_days)
    .bind(balance.used_days)
    .bind(balance.total_days - balance.used_days)
    .bind(balance.medical_days)
    .bind(balance.employee_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn append_history(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_id: Option<u64>,
    entry: LedgerEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO leave_balance_history (employee_id, leave_id, entry_date, days, kind)
        VALUES (?, ?, CURDATE(), ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(leave_id)
    .bind(entry.days)
    .bind(entry.kind.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn persist(
    conn: &mut MySqlConnection,
    balance: &LeaveBalance,
    leave_id: Option<u64>,
    entry: Option<LedgerEntry>,
) -> ApiResult<()> {
    save(conn, balance).await?;
    if let Some(entry) = entry {
        append_history(conn, balance.employee_id, leave_id, entry).await?;
    }
    Ok(())
}

/// Applies (`revert == false`) or undoes a leave's effect inside the caller's transaction.
pub async fn apply_effect(
    conn: &mut MySqlConnection,
    employee_id: u64,
    leave_id: u64,
    effect: LedgerEffect,
    revert: bool,
    default_days: i32,
) -> ApiResult<Option<LeaveBalance>> {
    if effect == LedgerEffect::Untracked {
        return Ok(None);
    }

    let mut balance = lock_or_create(conn, employee_id, default_days).await?;
    let entry = if revert {
        balance.revert(effect)?
    } else {
        balance.apply(effect)?
    };
    persist(conn, &balance, Some(leave_id), entry).await?;

    tracing::info!(
        employee_id,
        leave_id,
        used_days = balance.used_days,
        remaining_days = balance.remaining_days,
        medical_days = balance.medical_days,
        revert,
        "Leave balance updated"
    );
    Ok(Some(balance))
}

pub async fn adjust_total(
    pool: &MySqlPool,
    employee_id: u64,
    total_days: i32,
    default_days: i32,
) -> ApiResult<LeaveBalance> {
    let mut tx = pool.begin().await?;
    let mut balance = lock_or_create(&mut tx, employee_id, default_days).await?;
    let entry = balance.adjust_total(total_days)?;
    persist(&mut tx, &balance, None, (entry.days != 0).then_some(entry)).await?;
    tx.commit().await?;
    Ok(balance)
}

pub async fn history(pool: &MySqlPool, employee_id: u64) -> Result<Vec<LeaveHistoryEntry>, sqlx::Error> {
    sqlx::query_as::<_, LeaveHistoryEntry>(
        r#"
        SELECT id, employee_id, leave_id, entry_date, days, kind
        FROM leave_balance_history
        WHERE employee_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await
}

/// Seeds the balance of a freshly created employee.
pub async fn initialise(pool: &MySqlPool, employee_id: u64, total_days: i32) -> ApiResult<()> {
    let mut conn = pool.acquire().await?;
    ensure_exists(&mut conn, employee_id, total_days).await?;
    Ok(())
}
