use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Presence {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "08:58:12")]
    pub check_in: NaiveTime,
    #[schema(value_type = Option<String>, example = "17:31:40")]
    pub check_out: Option<NaiveTime>,
}

impl Presence {
    /// Minutes between check-in and check-out, `None` while still checked in.
    pub fn worked_minutes(&self) -> Option<i64> {
        self.check_out
            .map(|out| (out - self.check_in).num_minutes().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(check_in: (u32, u32), check_out: Option<(u32, u32)>) -> Presence {
        Presence {
            id: 1,
            employee_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            check_in: NaiveTime::from_hms_opt(check_in.0, check_in.1, 0).unwrap(),
            check_out: check_out.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
        }
    }

    #[test]
    fn worked_minutes_needs_a_check_out() {
        assert_eq!(presence((9, 0), None).worked_minutes(), None);
        assert_eq!(presence((9, 0), Some((17, 30))).worked_minutes(), Some(510));
    }
}
