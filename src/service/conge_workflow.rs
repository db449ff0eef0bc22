use chrono::NaiveDate;
use sqlx::{MySqlConnection, MySqlPool};

use crate::auth::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::model::conge::{
    Conge, CongeDocument, Decision, LeaveStatus, LeaveType, LedgerAction, count_working_days,
    derive_flags, ledger_action_on_delete, plan_transition,
};
use crate::service::ledger;

pub const CONGE_COLUMNS: &str = "id, employee_id, chef_id, leave_type, start_date, end_date, \
     number_of_days, reason, status, is_medical, deduct_from_balance, decided_by, decided_at, \
     decision_comment, created_at";

/// Validated shape of a leave request before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveDraft {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub number_of_days: i32,
    pub is_medical: bool,
    pub deduct_from_balance: bool,
}

impl LeaveDraft {
    pub fn new(
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        medical_override: Option<bool>,
    ) -> ApiResult<Self> {
        if start_date > end_date {
            return Err(ApiError::bad_request("start_date cannot be after end_date"));
        }
        let number_of_days = count_working_days(start_date, end_date);
        if number_of_days == 0 {
            return Err(ApiError::bad_request(
                "The requested period contains no working day",
            ));
        }
        let (is_medical, deduct_from_balance) = derive_flags(leave_type, medical_override);
        Ok(Self {
            leave_type,
            start_date,
            end_date,
            number_of_days,
            is_medical,
            deduct_from_balance,
        })
    }
}

pub fn can_view(auth: &AuthUser, conge: &Conge) -> bool {
    auth.is_self_or_hr(conge.employee_id) || conge.chef_id == Some(auth.employee_id)
}

/// The employee's chef or HR/Admin, never the requester themselves.
pub fn can_decide(auth: &AuthUser, conge: &Conge) -> bool {
    auth.employee_id != conge.employee_id
        && (auth.is_hr_or_admin() || conge.chef_id == Some(auth.employee_id))
}

pub fn can_edit(auth: &AuthUser, conge: &Conge) -> bool {
    auth.employee_id == conge.employee_id && conge.status().ok() == Some(LeaveStatus::Pending)
}

pub fn can_delete(auth: &AuthUser, conge: &Conge) -> bool {
    auth.is_hr_or_admin() || can_edit(auth, conge)
}

pub async fn find(pool: &MySqlPool, id: u64) -> ApiResult<Conge> {
    sqlx::query_as::<_, Conge>(&format!("SELECT {CONGE_COLUMNS} FROM conges WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))
}

async fn lock(conn: &mut MySqlConnection, id: u64) -> ApiResult<Conge> {
    sqlx::query_as::<_, Conge>(&format!(
        "SELECT {CONGE_COLUMNS} FROM conges WHERE id = ? FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request not found"))
}

pub async fn documents<'e, E>(executor: E, conge_id: u64) -> Result<Vec<CongeDocument>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    sqlx::query_as::<_, CongeDocument>(
        r#"
        SELECT id, conge_id, original_name, stored_name, content_type, size_bytes, uploaded_at
        FROM conge_documents
        WHERE conge_id = ?
        ORDER BY id
        "#,
    )
    .bind(conge_id)
    .fetch_all(executor)
    .await
}

async fn ensure_balance_covers(
    pool: &MySqlPool,
    employee_id: u64,
    draft: &LeaveDraft,
    default_days: i32,
) -> ApiResult<()> {
    if !draft.deduct_from_balance {
        return Ok(());
    }
    let balance = ledger::get_or_create(pool, employee_id, default_days).await?;
    if balance.remaining_days < draft.number_of_days {
        return Err(ApiError::bad_request(format!(
            "Insufficient leave balance: {} day(s) requested, {} remaining",
            draft.number_of_days, balance.remaining_days
        )));
    }
    Ok(())
}

/// Inserts a pending request for `employee_id`, routed to the employee's chef.
pub async fn submit(
    pool: &MySqlPool,
    employee_id: u64,
    draft: &LeaveDraft,
    reason: Option<&str>,
    default_days: i32,
) -> ApiResult<Conge> {
    let chef_id: Option<u64> =
        sqlx::query_scalar::<_, Option<u64>>("SELECT chef_id FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    ensure_balance_covers(pool, employee_id, draft, default_days).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO conges
            (employee_id, chef_id, leave_type, start_date, end_date, number_of_days,
             reason, status, is_medical, deduct_from_balance)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(chef_id)
    .bind(draft.leave_type.to_string())
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(draft.number_of_days)
    .bind(reason)
    .bind(LeaveStatus::Pending.to_string())
    .bind(draft.is_medical)
    .bind(draft.deduct_from_balance)
    .execute(pool)
    .await?;

    find(pool, result.last_insert_id()).await
}

/// Rewrites a pending request. The status check is repeated under the row lock.
pub async fn amend(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
    draft: &LeaveDraft,
    reason: Option<&str>,
    default_days: i32,
) -> ApiResult<Conge> {
    let mut tx = pool.begin().await?;
    let conge = lock(&mut tx, id).await?;
    if !can_edit(auth, &conge) {
        return Err(ApiError::forbidden(
            "Only the requester can modify a pending leave request",
        ));
    }
    if draft.deduct_from_balance {
        let balance = ledger::lock_or_create(&mut tx, conge.employee_id, default_days).await?;
        if balance.remaining_days < draft.number_of_days {
            return Err(ApiError::bad_request(format!(
                "Insufficient leave balance: {} day(s) requested, {} remaining",
                draft.number_of_days, balance.remaining_days
            )));
        }
    }

    sqlx::query(
        r#"
        UPDATE conges
        SET leave_type = ?, start_date = ?, end_date = ?, number_of_days = ?,
            reason = COALESCE(?, reason), is_medical = ?, deduct_from_balance = ?
        WHERE id = ?
        "#,
    )
    .bind(draft.leave_type.to_string())
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(draft.number_of_days)
    .bind(reason)
    .bind(draft.is_medical)
    .bind(draft.deduct_from_balance)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    find(pool, id).await
}

async fn run_ledger(
    conn: &mut MySqlConnection,
    conge: &Conge,
    action: LedgerAction,
    default_days: i32,
) -> ApiResult<()> {
    let revert = match action {
        LedgerAction::Nothing => return Ok(()),
        LedgerAction::Apply => false,
        LedgerAction::Revert => true,
    };
    ledger::apply_effect(
        conn,
        conge.employee_id,
        conge.id,
        conge.ledger_effect(),
        revert,
        default_days,
    )
    .await?;
    Ok(())
}

/// Checks the decider and the transition against the locked row.
fn plan_decision(
    auth: &AuthUser,
    conge: &Conge,
    decision: Decision,
) -> ApiResult<(LeaveStatus, LedgerAction)> {
    if !can_decide(auth, conge) {
        return Err(ApiError::forbidden(
            "Only the employee's chef or HR/Admin can decide this request",
        ));
    }
    Ok(plan_transition(conge.status()?, decision)?)
}

/// Approves or rejects a request and moves the ledger in the same transaction.
pub async fn decide(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
    decision: Decision,
    comment: Option<&str>,
    default_days: i32,
) -> ApiResult<Conge> {
    let mut tx = pool.begin().await?;
    let conge = lock(&mut tx, id).await?;

    let (next, action) = plan_decision(auth, &conge, decision)?;
    run_ledger(&mut tx, &conge, action, default_days).await?;

    sqlx::query(
        r#"
        UPDATE conges
        SET status = ?, decided_by = ?, decided_at = UTC_TIMESTAMP(), decision_comment = ?
        WHERE id = ?
        "#,
    )
    .bind(next.to_string())
    .bind(auth.employee_id)
    .bind(comment)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(leave_id = id, from = %conge.status, to = %next, by = auth.employee_id, "Leave status changed");
    find(pool, id).await
}

/// Deletes a request, crediting the ledger back when it had been approved.
/// Returns the deleted row and its documents so stored files can be removed.
pub async fn remove(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
    default_days: i32,
) -> ApiResult<(Conge, Vec<CongeDocument>)> {
    let mut tx = pool.begin().await?;
    let conge = lock(&mut tx, id).await?;
    if !can_delete(auth, &conge) {
        return Err(ApiError::forbidden(
            "Only HR/Admin or the requester of a pending request can delete it",
        ));
    }
    let docs = documents(&mut *tx, id).await?;

    run_ledger(&mut tx, &conge, ledger_action_on_delete(conge.status()?), default_days).await?;

    sqlx::query("DELETE FROM conges WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(leave_id = id, status = %conge.status, by = auth.employee_id, "Leave request deleted");
    Ok((conge, docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn user(employee_id: u64, role: Role) -> AuthUser {
        AuthUser {
            employee_id,
            email: format!("{employee_id}@corp.test"),
            role,
        }
    }

    fn conge(employee_id: u64, chef_id: Option<u64>, status: LeaveStatus) -> Conge {
        Conge {
            id: 1,
            employee_id,
            chef_id,
            leave_type: "annual".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            number_of_days: 2,
            reason: None,
            status: status.to_string(),
            is_medical: false,
            deduct_from_balance: true,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
            created_at: None,
        }
    }

    #[test]
    fn draft_counts_working_days_and_sets_flags() {
        let draft = LeaveDraft::new(
            LeaveType::Sick,
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(draft.number_of_days, 4);
        assert!(draft.is_medical);
        assert!(!draft.deduct_from_balance);
    }

    #[test]
    fn draft_rejects_inverted_or_weekend_only_ranges() {
        let sat = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let sun = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        assert!(LeaveDraft::new(LeaveType::Annual, sun, sat, None).is_err());
        assert!(LeaveDraft::new(LeaveType::Annual, sat, sun, None).is_err());
    }

    #[test]
    fn chef_and_hr_can_decide_but_not_the_requester() {
        let request = conge(10, Some(3), LeaveStatus::Pending);
        assert!(can_decide(&user(3, Role::Chef), &request));
        assert!(can_decide(&user(2, Role::Hr), &request));
        assert!(!can_decide(&user(4, Role::Chef), &request));
        assert!(!can_decide(&user(10, Role::Admin), &request));
    }

    #[test]
    fn visibility_covers_owner_chef_and_hr() {
        let request = conge(10, Some(3), LeaveStatus::Approved);
        assert!(can_view(&user(10, Role::Employee), &request));
        assert!(can_view(&user(3, Role::Chef), &request));
        assert!(can_view(&user(1, Role::Admin), &request));
        assert!(!can_view(&user(11, Role::Employee), &request));
    }

    #[test]
    fn repeated_decisions_are_conflicts() {
        use actix_web::{ResponseError, http::StatusCode};

        let chef = user(3, Role::Chef);
        let approved = conge(10, Some(3), LeaveStatus::Approved);
        let err = plan_decision(&chef, &approved, Decision::Approve).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let rejected = conge(10, Some(3), LeaveStatus::Rejected);
        for decision in [Decision::Approve, Decision::Reject] {
            let err = plan_decision(&chef, &rejected, decision).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }

        assert_eq!(
            plan_decision(&chef, &approved, Decision::Reject).unwrap(),
            (LeaveStatus::Rejected, LedgerAction::Revert)
        );
    }

    #[test]
    fn outsiders_are_refused_before_the_transition_is_checked() {
        use actix_web::{ResponseError, http::StatusCode};

        let err = plan_decision(&user(4, Role::Chef), &conge(10, Some(3), LeaveStatus::Approved), Decision::Approve)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unknown_stored_status_is_an_error() {
        let mut row = conge(10, Some(3), LeaveStatus::Pending);
        row.status = "en_attente".into();
        assert!(row.status().is_err());
        assert!(!can_edit(&user(10, Role::Employee), &row));
        assert!(plan_decision(&user(3, Role::Chef), &row, Decision::Approve).is_err());
    }

    #[test]
    fn requester_may_only_touch_pending_requests() {
        let owner = user(10, Role::Employee);
        assert!(can_edit(&owner, &conge(10, None, LeaveStatus::Pending)));
        assert!(!can_edit(&owner, &conge(10, None, LeaveStatus::Approved)));
        assert!(!can_delete(&owner, &conge(10, None, LeaveStatus::Approved)));
        assert!(can_delete(&user(2, Role::Hr), &conge(10, None, LeaveStatus::Approved)));
    }
}
