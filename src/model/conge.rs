use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

use crate::model::leave_balance::LedgerEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
    Exceptional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// What a status change does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Apply,
    Revert,
    Nothing,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum TransitionError {
    #[display(fmt = "Leave request is already approved")]
    AlreadyApproved,
    #[display(fmt = "Leave request is already rejected")]
    AlreadyRejected,
}

#[derive(Debug, Display, PartialEq, Eq)]
#[display(fmt = "unknown leave status '{}'", _0)]
pub struct UnknownStatus(pub String);

/// Row of the `conges` table.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Conge {
    pub id: u64,
    pub employee_id: u64,
    pub chef_id: Option<u64>,
    #[schema(example = "annual")]
    pub leave_type: String,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date", example = "2026-03-06")]
    pub end_date: NaiveDate,
    pub number_of_days: i32,
    pub reason: Option<String>,
    #[schema(example = "pending")]
    pub status: String,
    pub is_medical: bool,
    pub deduct_from_balance: bool,
    pub decided_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_comment: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conge {
    pub fn status(&self) -> Result<LeaveStatus, UnknownStatus> {
        LeaveStatus::from_str(&self.status).map_err(|_| UnknownStatus(self.status.clone()))
    }

    pub fn ledger_effect(&self) -> LedgerEffect {
        ledger_effect(self.is_medical, self.deduct_from_balance, self.number_of_days)
    }
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct CongeDocument {
    pub id: u64,
    pub conge_id: u64,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Medical and deduction flags a request gets from its type.
pub fn derive_flags(leave_type: LeaveType, medical_override: Option<bool>) -> (bool, bool) {
    let is_medical = leave_type == LeaveType::Sick || medical_override.unwrap_or(false);
    let deduct = !is_medical && leave_type != LeaveType::Unpaid;
    (is_medical, deduct)
}

pub fn ledger_effect(is_medical: bool, deduct_from_balance: bool, days: i32) -> LedgerEffect {
    if deduct_from_balance {
        LedgerEffect::Deduct(days)
    } else if is_medical {
        LedgerEffect::Medical(days)
    } else {
        LedgerEffect::Untracked
    }
}

/// Monday to Friday days in the inclusive range; zero when `end < start`.
pub fn count_working_days(start: NaiveDate, end: NaiveDate) -> i32 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as i32
}

pub fn plan_transition(
    current: LeaveStatus,
    decision: Decision,
) -> Result<(LeaveStatus, LedgerAction), TransitionError> {
    match (current, decision) {
        (LeaveStatus::Pending, Decision::Approve) => Ok((LeaveStatus::Approved, LedgerAction::Apply)),
        (LeaveStatus::Pending, Decision::Reject) => Ok((LeaveStatus::Rejected, LedgerAction::Nothing)),
        (LeaveStatus::Approved, Decision::Reject) => Ok((LeaveStatus::Rejected, LedgerAction::Revert)),
        (LeaveStatus::Approved, Decision::Approve) => Err(TransitionError::AlreadyApproved),
        (LeaveStatus::Rejected, _) => Err(TransitionError::AlreadyRejected),
    }
}

pub fn ledger_action_on_delete(status: LeaveStatus) -> LedgerAction {
    match status {
        LeaveStatus::Approved => LedgerAction::Revert,
        LeaveStatus::Pending | LeaveStatus::Rejected => LedgerAction::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_balance::LeaveBalance;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn step(
        balance: &mut LeaveBalance,
        status: &mut LeaveStatus,
        effect: LedgerEffect,
        decision: Decision,
    ) -> Result<(), TransitionError> {
        let (next, action) = plan_transition(*status, decision)?;
        match action {
            LedgerAction::Apply => {
                balance.apply(effect).unwrap();
            }
            LedgerAction::Revert => {
                balance.revert(effect).unwrap();
            }
            LedgerAction::Nothing => {}
        }
        *status = next;
        Ok(())
    }

    #[test]
    fn working_days_skip_weekends() {
        // 2026-03-02 is a Monday
        assert_eq!(count_working_days(date(2026, 3, 2), date(2026, 3, 6)), 5);
        assert_eq!(count_working_days(date(2026, 3, 2), date(2026, 3, 9)), 6);
        assert_eq!(count_working_days(date(2026, 3, 7), date(2026, 3, 8)), 0);
        assert_eq!(count_working_days(date(2026, 3, 6), date(2026, 3, 2)), 0);
    }

    #[test]
    fn flags_follow_leave_type() {
        assert_eq!(derive_flags(LeaveType::Annual, None), (false, true));
        assert_eq!(derive_flags(LeaveType::Sick, None), (true, false));
        assert_eq!(derive_flags(LeaveType::Unpaid, None), (false, false));
        assert_eq!(derive_flags(LeaveType::Exceptional, Some(true)), (true, false));
    }

    #[test]
    fn only_documented_transitions_are_allowed() {
        use LeaveStatus::*;
        assert_eq!(plan_transition(Pending, Decision::Approve), Ok((Approved, LedgerAction::Apply)));
        assert_eq!(plan_transition(Pending, Decision::Reject), Ok((Rejected, LedgerAction::Nothing)));
        assert_eq!(plan_transition(Approved, Decision::Reject), Ok((Rejected, LedgerAction::Revert)));
        assert_eq!(plan_transition(Approved, Decision::Approve), Err(TransitionError::AlreadyApproved));
        assert_eq!(plan_transition(Rejected, Decision::Approve), Err(TransitionError::AlreadyRejected));
        assert_eq!(plan_transition(Rejected, Decision::Reject), Err(TransitionError::AlreadyRejected));
    }

    #[test]
    fn approving_twice_debits_once() {
        let mut balance = LeaveBalance::new(1, 30);
        let mut status = LeaveStatus::Pending;
        let effect = LedgerEffect::Deduct(4);

        step(&mut balance, &mut status, effect, Decision::Approve).unwrap();
        assert!(step(&mut balance, &mut status, effect, Decision::Approve).is_err());
        assert_eq!(balance.used_days, 4);
        assert_eq!(balance.remaining_days, 26);
    }

    #[test]
    fn reject_after_approve_restores_balance() {
        let mut balance = LeaveBalance::new(1, 30);
        let mut status = LeaveStatus::Pending;
        let effect = LedgerEffect::Deduct(3);

        step(&mut balance, &mut status, effect, Decision::Approve).unwrap();
        step(&mut balance, &mut status, effect, Decision::Reject).unwrap();
        assert_eq!(status, LeaveStatus::Rejected);
        assert_eq!(balance, LeaveBalance::new(1, 30));
    }

    #[test]
    fn medical_and_unpaid_leaves_never_change_used_days() {
        for (leave_type, days) in [(LeaveType::Sick, 5), (LeaveType::Unpaid, 2)] {
            let (is_medical, deduct) = derive_flags(leave_type, None);
            let effect = ledger_effect(is_medical, deduct, days);
            let mut balance = LeaveBalance::new(1, 30);
            let mut status = LeaveStatus::Pending;

            step(&mut balance, &mut status, effect, Decision::Approve).unwrap();
            assert_eq!(balance.used_days, 0);
            step(&mut balance, &mut status, effect, Decision::Reject).unwrap();
            assert_eq!(balance.used_days, 0);
            assert_eq!(balance.medical_days, 0);
        }
    }

    #[test]
    fn invariant_holds_over_mixed_sequences() {
        let mut balance = LeaveBalance::new(1, 30);
        let effects = [LedgerEffect::Deduct(2), LedgerEffect::Deduct(5), LedgerEffect::Medical(1)];
        let mut statuses = [LeaveStatus::Pending; 3];

        for (i, effect) in effects.iter().enumerate() {
            step(&mut balance, &mut statuses[i], *effect, Decision::Approve).unwrap();
            assert!(balance.is_consistent());
        }
        step(&mut balance, &mut statuses[1], effects[1], Decision::Reject).unwrap();
        assert!(balance.is_consistent());

        // deleting the still-approved first request
        assert_eq!(ledger_action_on_delete(statuses[0]), LedgerAction::Revert);
        balance.revert(effects[0]).unwrap();
        assert!(balance.is_consistent());
        assert_eq!(balance.used_days, 0);
        assert_eq!(balance.medical_days, 1);
        assert_eq!(ledger_action_on_delete(statuses[1]), LedgerAction::Nothing);
    }
}
