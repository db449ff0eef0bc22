use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Hr,
    Chef,
    Employee,
}

impl Role {
    /// Admin and HR act on every employee record.
    pub fn is_hr_or_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Admin | Role::Hr | Role::Chef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_stored_labels() {
        assert_eq!(Role::from_str("chef").unwrap(), Role::Chef);
        assert_eq!(Role::Hr.to_string(), "hr");
        assert!(Role::from_str("boss").is_err());
    }
}
