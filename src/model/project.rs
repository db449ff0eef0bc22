use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    Active,
    Completed,
    OnHold,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub chef_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "active")]
    pub status: String,
    /// Rounded mean completion of the project's tasks
    #[schema(example = 45)]
    pub progress: i32,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Rounded mean of task completions, 0 for a project without tasks.
pub fn compute_progress(completions: &[i32]) -> i32 {
    if completions.is_empty() {
        return 0;
    }
    let sum: i64 = completions.iter().map(|c| i64::from((*c).clamp(0, 100))).sum();
    let n = completions.len() as i64;
    ((sum * 2 + n) / (n * 2)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_the_rounded_mean() {
        assert_eq!(compute_progress(&[]), 0);
        assert_eq!(compute_progress(&[100, 0]), 50);
        assert_eq!(compute_progress(&[100, 0, 0]), 33);
        assert_eq!(compute_progress(&[100, 100, 0]), 67);
        assert_eq!(compute_progress(&[25, 50]), 38);
    }
}
