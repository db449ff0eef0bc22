use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::role::Role;

/// Only `active` accounts may log in or refresh tokens.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

/// Employee as returned by the API. The password hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "Jane",
        "last_name": "Doe",
        "email": "jane.doe@company.com",
        "phone": "+33612345678",
        "role": "employee",
        "department_id": 10,
        "chef_id": 3,
        "job_title": "Accountant",
        "hire_date": "2024-01-01",
        "status": "active"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "Jane")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "jane.doe@company.com")]
    pub email: String,

    #[schema(example = "+33612345678", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = "employee")]
    pub role: String,

    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,

    /// Manager of this employee
    #[schema(example = 3, nullable = true)]
    pub chef_id: Option<u64>,

    #[schema(example = "Accountant", nullable = true)]
    pub job_title: Option<String>,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub hire_date: NaiveDate,

    #[schema(example = "active")]
    pub status: String,

    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

pub const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, role, \
     department_id, chef_id, job_title, hire_date, status, created_at";

impl Employee {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_labels_are_lowercase_and_strict() {
        assert_eq!(EmployeeStatus::from_str("inactive").unwrap(), EmployeeStatus::Inactive);
        assert_eq!(EmployeeStatus::Active.to_string(), "active");
        assert!(EmployeeStatus::from_str("Active").is_err());
        assert!(serde_json::from_str::<EmployeeStatus>("\"actve\"").is_err());
    }
}
