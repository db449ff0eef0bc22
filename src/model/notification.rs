use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    LeaveSubmitted,
    LeaveApproved,
    LeaveRejected,
    LeaveCancelled,
    TaskAssigned,
    EvaluationPublished,
    Message,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: u64,
    pub recipient_id: u64,
    #[schema(example = "leave_approved")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}
