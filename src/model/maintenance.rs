use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const GLOBAL_FLAG: &str = "global";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct MaintenanceFlag {
    #[schema(example = "global")]
    pub name: String,
    pub enabled: bool,
    #[schema(example = "Scheduled upgrade, back at 14:00")]
    pub message: Option<String>,
}
