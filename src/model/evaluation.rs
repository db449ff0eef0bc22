use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_SCORE: i32 = 100;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Evaluation {
    pub id: u64,
    pub employee_id: u64,
    pub evaluator_id: u64,
    #[schema(example = "2026-Q1")]
    pub period: String,
    #[schema(example = 82)]
    pub score: i32,
    pub comments: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

pub fn validate_score(score: i32) -> Result<(), String> {
    if (0..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(format!("score must be between 0 and {MAX_SCORE}"))
    }
}
