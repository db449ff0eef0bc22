use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Qcm {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Stored question; `options` holds a JSON array of strings.
#[derive(Debug, sqlx::FromRow)]
pub struct QcmQuestionRow {
    pub id: u64,
    pub qcm_id: u64,
    pub position: i32,
    pub prompt: String,
    pub options: String,
    pub correct_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QcmQuestion {
    #[schema(example = "Which form is used to request a leave?")]
    pub prompt: String,
    #[schema(example = json!(["Form A", "Form B", "Form C"]))]
    pub options: Vec<String>,
    /// Hidden from employees taking the quiz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct QcmSubmission {
    pub id: u64,
    pub qcm_id: u64,
    pub employee_id: u64,
    pub score: i32,
    pub total: i32,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl QcmQuestionRow {
    pub fn into_question(self, reveal_answer: bool) -> Result<QcmQuestion, serde_json::Error> {
        Ok(QcmQuestion {
            prompt: self.prompt,
            options: serde_json::from_str(&self.options)?,
            correct_index: reveal_answer.then_some(self.correct_index as usize),
        })
    }
}

pub fn validate_question(question: &QcmQuestion) -> Result<usize, String> {
    if question.prompt.trim().is_empty() {
        return Err("question prompt must not be empty".to_string());
    }
    if question.options.len() < 2 {
        return Err("a question needs at least two options".to_string());
    }
    match question.correct_index {
        Some(i) if i < question.options.len() => Ok(i),
        Some(_) => Err("correct_index is out of range".to_string()),
        None => Err("correct_index is required".to_string()),
    }
}

/// Counts answers matching the key; answers missing or out of range score nothing.
pub fn score_answers(correct: &[usize], answers: &[Option<usize>]) -> i32 {
    correct
        .iter()
        .enumerate()
        .filter(|(i, key)| answers.get(*i).copied().flatten() == Some(**key))
        .count() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_counts_matching_positions() {
        let key = [0, 2, 1];
        assert_eq!(score_answers(&key, &[Some(0), Some(2), Some(1)]), 3);
        assert_eq!(score_answers(&key, &[Some(0), None, Some(0)]), 1);
        assert_eq!(score_answers(&key, &[Some(0)]), 1);
        assert_eq!(score_answers(&key, &[]), 0);
    }

    #[test]
    fn question_validation() {
        let mut q = QcmQuestion {
            prompt: "Capital of France?".into(),
            options: vec!["Paris".into(), "Lyon".into()],
            correct_index: Some(0),
        };
        assert_eq!(validate_question(&q), Ok(0));
        q.correct_index = Some(2);
        assert!(validate_question(&q).is_err());
        q.options.truncate(1);
        q.correct_index = Some(0);
        assert!(validate_question(&q).is_err());
    }

    #[test]
    fn answers_are_hidden_unless_revealed() {
        let row = QcmQuestionRow {
            id: 1,
            qcm_id: 1,
            position: 0,
            prompt: "p".into(),
            options: r#"["a","b"]"#.into(),
            correct_index: 1,
        };
        let q = row.into_question(false).unwrap();
        assert_eq!(q.options, vec!["a", "b"]);
        assert_eq!(q.correct_index, None);
    }
}
