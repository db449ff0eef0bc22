use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    pub id: u64,
    pub project_id: u64,
    pub assignee_id: Option<u64>,
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "in_progress")]
    pub status: String,
    #[schema(example = 40)]
    pub completion: i32,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Reconciles a status and a completion percentage.
///
/// `done` always means 100%, 100% always means `done`, and partial work on a
/// `todo` task moves it to `in_progress`. An explicit status wins over a
/// conflicting completion.
pub fn normalize_progress(
    status: Option<TaskStatus>,
    completion: Option<i32>,
) -> Result<(TaskStatus, i32), String> {
    if let Some(c) = completion {
        if !(0..=100).contains(&c) {
            return Err("completion must be between 0 and 100".to_string());
        }
    }

    Ok(match (status, completion) {
        (Some(TaskStatus::Done), _) | (_, Some(100)) => (TaskStatus::Done, 100),
        (Some(TaskStatus::Todo), Some(c)) if c > 0 => (TaskStatus::InProgress, c),
        (Some(TaskStatus::Todo), _) => (TaskStatus::Todo, 0),
        (Some(TaskStatus::InProgress), c) => (TaskStatus::InProgress, c.unwrap_or(0)),
        (None, Some(0)) => (TaskStatus::Todo, 0),
        (None, Some(c)) => (TaskStatus::InProgress, c),
        (None, None) => (TaskStatus::Todo, 0),
    })
}

/// Progress report against a stored task. A missing completion keeps the
/// stored value unless the status alone fixes it.
pub fn progress_update(
    stored_completion: i32,
    status: Option<TaskStatus>,
    completion: Option<i32>,
) -> Result<(TaskStatus, i32), String> {
    let completion = completion.or(match status {
        Some(TaskStatus::Todo) | Some(TaskStatus::Done) => None,
        Some(TaskStatus::InProgress) => Some(stored_completion).filter(|c| *c < 100),
        None => Some(stored_completion),
    });
    normalize_progress(status, completion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_report_keeps_stored_completion() {
        assert_eq!(progress_update(40, None, None), Ok((TaskStatus::InProgress, 40)));
        assert_eq!(progress_update(40, Some(TaskStatus::InProgress), None), Ok((TaskStatus::InProgress, 40)));
        assert_eq!(progress_update(0, None, None), Ok((TaskStatus::Todo, 0)));
        assert_eq!(progress_update(100, None, None), Ok((TaskStatus::Done, 100)));
    }

    #[test]
    fn status_that_implies_a_value_overrides_the_stored_one() {
        assert_eq!(progress_update(40, Some(TaskStatus::Done), None), Ok((TaskStatus::Done, 100)));
        assert_eq!(progress_update(40, Some(TaskStatus::Todo), None), Ok((TaskStatus::Todo, 0)));
        // reopening a finished task
        assert_eq!(progress_update(100, Some(TaskStatus::InProgress), None), Ok((TaskStatus::InProgress, 0)));
        assert_eq!(progress_update(40, None, Some(70)), Ok((TaskStatus::InProgress, 70)));
    }

    #[test]
    fn done_means_complete() {
        assert_eq!(normalize_progress(Some(TaskStatus::Done), Some(10)), Ok((TaskStatus::Done, 100)));
        assert_eq!(normalize_progress(None, Some(100)), Ok((TaskStatus::Done, 100)));
        assert_eq!(
            normalize_progress(Some(TaskStatus::InProgress), Some(100)),
            Ok((TaskStatus::Done, 100))
        );
    }

    #[test]
    fn partial_work_is_in_progress() {
        assert_eq!(normalize_progress(Some(TaskStatus::Todo), Some(30)), Ok((TaskStatus::InProgress, 30)));
        assert_eq!(normalize_progress(None, Some(55)), Ok((TaskStatus::InProgress, 55)));
    }

    #[test]
    fn defaults_to_todo() {
        assert_eq!(normalize_progress(None, None), Ok((TaskStatus::Todo, 0)));
        assert_eq!(normalize_progress(Some(TaskStatus::Todo), None), Ok((TaskStatus::Todo, 0)));
    }

    #[test]
    fn out_of_range_completion_is_rejected() {
        assert!(normalize_progress(None, Some(101)).is_err());
        assert!(normalize_progress(Some(TaskStatus::Done), Some(-1)).is_err());
    }
}
