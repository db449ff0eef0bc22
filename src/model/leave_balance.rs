use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

/// Per-employee leave counters. `remaining_days` is always `total_days - used_days`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "employee_id": 12,
    "total_days": 30,
    "used_days": 4,
    "remaining_days": 26,
    "medical_days": 2
}))]
pub struct LeaveBalance {
    pub employee_id: u64,
    pub total_days: i32,
    pub used_days: i32,
    pub remaining_days: i32,
    pub medical_days: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryKind {
    Debit,
    Credit,
    Medical,
    MedicalReversal,
    Adjustment,
}

/// One append-only line of the ledger history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub kind: HistoryKind,
    pub days: i32,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct LeaveHistoryEntry {
    pub id: u64,
    pub employee_id: u64,
    pub leave_id: Option<u64>,
    #[schema(value_type = String, format = "date")]
    pub entry_date: NaiveDate,
    pub days: i32,
    #[schema(example = "debit")]
    pub kind: String,
}

/// What approving a given leave does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    Deduct(i32),
    Medical(i32),
    Untracked,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum LedgerError {
    #[display(fmt = "Day count must be positive, got {}", _0)]
    InvalidDays(i32),
    #[display(
        fmt = "Insufficient leave balance: {} day(s) requested, {} remaining",
        requested,
        remaining
    )]
    Insufficient { requested: i32, remaining: i32 },
    #[display(fmt = "Total days ({}) cannot be below used days ({})", total, used)]
    TotalBelowUsed { total: i32, used: i32 },
}

impl LeaveBalance {
    pub fn new(employee_id: u64, total_days: i32) -> Self {
        Self {
            employee_id,
            total_days,
            used_days: 0,
            remaining_days: total_days,
            medical_days: 0,
            updated_at: None,
        }
    }

    pub fn recompute(&mut self) {
        self.remaining_days = self.total_days - self.used_days;
    }

    pub fn debit(&mut self, days: i32) -> Result<LedgerEntry, LedgerError> {
        positive(days)?;
        if self.remaining_days < days {
            return Err(LedgerError::Insufficient {
                requested: days,
                remaining: self.remaining_days,
            });
        }
        self.used_days += days;
        self.recompute();
        Ok(LedgerEntry { kind: HistoryKind::Debit, days })
    }

    /// Gives days back. Never takes `used_days` below zero; the entry records what was returned.
    pub fn credit(&mut self, days: i32) -> Result<LedgerEntry, LedgerError> {
        positive(days)?;
        let returned = days.min(self.used_days);
        self.used_days -= returned;
        self.recompute();
        Ok(LedgerEntry { kind: HistoryKind::Credit, days: returned })
    }

    pub fn record_medical(&mut self, days: i32) -> Result<LedgerEntry, LedgerError> {
        positive(days)?;
        self.medical_days += days;
        Ok(LedgerEntry { kind: HistoryKind::Medical, days })
    }

    pub fn reverse_medical(&mut self, days: i32) -> Result<LedgerEntry, LedgerError> {
        positive(days)?;
        let returned = days.min(self.medical_days);
        self.medical_days -= returned;
        Ok(LedgerEntry { kind: HistoryKind::MedicalReversal, days: returned })
    }

    pub fn adjust_total(&mut self, total_days: i32) -> Result<LedgerEntry, LedgerError> {
        if total_days < self.used_days {
            return Err(LedgerError::TotalBelowUsed {
                total: total_days,
                used: self.used_days,
            });
        }
        let delta = total_days - self.total_days;
        self.total_days = total_days;
        self.recompute();
        Ok(LedgerEntry { kind: HistoryKind::Adjustment, days: delta })
    }

    /// Applies the effect of an approval. `Untracked` leaves write nothing.
    pub fn apply(&mut self, effect: LedgerEffect) -> Result<Option<LedgerEntry>, LedgerError> {
        match effect {
            LedgerEffect::Deduct(days) => self.debit(days).map(Some),
            LedgerEffect::Medical(days) => self.record_medical(days).map(Some),
            LedgerEffect::Untracked => Ok(None),
        }
    }

    /// Undoes a previous `apply` of the same effect.
    pub fn revert(&mut self, effect: LedgerEffect) -> Result<Option<LedgerEntry>, LedgerError> {
        match effect {
            LedgerEffect::Deduct(days) => self.credit(days).map(Some),
            LedgerEffect::Medical(days) => self.reverse_medical(days).map(Some),
            LedgerEffect::Untracked => Ok(None),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.remaining_days == self.total_days - self.used_days && self.used_days >= 0
    }
}

fn positive(days: i32) -> Result<(), LedgerError> {
    if days > 0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidDays(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_balance_starts_full() {
        let b = LeaveBalance::new(1, 30);
        assert_eq!(b.remaining_days, 30);
        assert!(b.is_consistent());
    }

    #[test]
    fn debit_then_credit_restores_balance() {
        let mut b = LeaveBalance::new(1, 30);
        b.debit(5).unwrap();
        assert_eq!((b.used_days, b.remaining_days), (5, 25));
        let entry = b.credit(5).unwrap();
        assert_eq!(entry, LedgerEntry { kind: HistoryKind::Credit, days: 5 });
        assert_eq!((b.used_days, b.remaining_days), (0, 30));
    }

    #[test]
    fn overdraw_is_refused_and_leaves_balance_untouched() {
        let mut b = LeaveBalance::new(1, 3);
        let err = b.debit(4).unwrap_err();
        assert_eq!(err, LedgerError::Insufficient { requested: 4, remaining: 3 });
        assert_eq!(b, LeaveBalance::new(1, 3));
    }

    #[test]
    fn credit_never_takes_used_below_zero() {
        let mut b = LeaveBalance::new(1, 30);
        b.debit(2).unwrap();
        let entry = b.credit(10).unwrap();
        assert_eq!(entry.days, 2);
        assert_eq!(b.used_days, 0);
        assert!(b.is_consistent());
    }

    #[test]
    fn medical_days_do_not_touch_used_days() {
        let mut b = LeaveBalance::new(1, 30);
        b.apply(LedgerEffect::Medical(3)).unwrap();
        assert_eq!(b.medical_days, 3);
        assert_eq!(b.used_days, 0);
        b.revert(LedgerEffect::Medical(3)).unwrap();
        assert_eq!(b.medical_days, 0);
    }

    #[test]
    fn untracked_effect_writes_no_history() {
        let mut b = LeaveBalance::new(1, 30);
        assert_eq!(b.apply(LedgerEffect::Untracked).unwrap(), None);
        assert_eq!(b, LeaveBalance::new(1, 30));
    }

    #[test]
    fn adjusting_total_recomputes_remaining() {
        let mut b = LeaveBalance::new(1, 30);
        b.debit(10).unwrap();
        let entry = b.adjust_total(25).unwrap();
        assert_eq!(entry.days, -5);
        assert_eq!(b.remaining_days, 15);
        assert!(matches!(
            b.adjust_total(9),
            Err(LedgerError::TotalBelowUsed { total: 9, used: 10 })
        ));
    }

    #[test]
    fn zero_or_negative_days_are_invalid() {
        let mut b = LeaveBalance::new(1, 30);
        assert_eq!(b.debit(0), Err(LedgerError::InvalidDays(0)));
        assert_eq!(b.credit(-2), Err(LedgerError::InvalidDays(-2)));
    }
}
