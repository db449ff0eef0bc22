use crate::api::conge::{CongeFilter, CongeListResponse, CreateConge, DecisionBody, UpdateConge};
use crate::api::department::DepartmentPayload;
use crate::api::employee::{CreateEmployee, EmployeeListResponse, EmployeeQuery, UpdateEmployee};
use crate::api::evaluation::{CreateEvaluation, UpdateEvaluation};
use crate::api::leave_balance::AdjustBalance;
use crate::api::maintenance::SetMaintenance;
use crate::api::message::SendMessage;
use crate::api::project::{ProjectListResponse, ProjectPayload};
use crate::api::qcm::{CreateQcm, QcmDetail, SubmitAnswers};
use crate::api::task::{CreateTask, TaskProgress, UpdateTask};
use crate::model::conge::{Conge, CongeDocument, LeaveStatus, LeaveType};
use crate::model::department::Department;
use crate::model::employee::{Employee, EmployeeStatus};
use crate::model::evaluation::Evaluation;
use crate::model::leave_balance::{HistoryKind, LeaveBalance, LeaveHistoryEntry};
use crate::model::maintenance::MaintenanceFlag;
use crate::model::message::Message;
use crate::model::notification::Notification;
use crate::model::presence::Presence;
use crate::model::project::{Project, ProjectStatus};
use crate::model::qcm::{Qcm, QcmQuestion, QcmSubmission};
use crate::model::role::Role;
use crate::model::task::{Task, TaskStatus};
use crate::models::{ChangePasswordDto, LoginReqDto, TokenPair};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Backend API",
        version = "1.0.0",
        description = r#"
## HR management backend

Employees, leave requests (congés) with a per-employee balance ledger,
projects and tasks, QCM questionnaires, presence, evaluations, departments,
notifications, messaging and a global maintenance switch.

### Security
Every `/api` endpoint expects a JWT access token: `Authorization: Bearer <token>`.
Tokens are obtained from `/auth/login` and rotated with `/auth/refresh`.
Roles are `admin`, `hr`, `chef` and `employee`.

### Leave balance
Approving an annual or exceptional leave debits the balance, rejecting or
deleting an approved one credits it back. Sick leave is counted as medical
days and unpaid leave is not tracked.

### Errors
Errors are JSON: `{"message": "..."}`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::change_password,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::list_subordinates,

        crate::api::conge::create_conge,
        crate::api::conge::list_conges,
        crate::api::conge::get_conge,
        crate::api::conge::update_conge,
        crate::api::conge::approve_conge,
        crate::api::conge::reject_conge,
        crate::api::conge::delete_conge,
        crate::api::conge::upload_documents,
        crate::api::conge::list_documents,

        crate::api::leave_balance::my_balance,
        crate::api::leave_balance::get_balance,
        crate::api::leave_balance::adjust_balance,
        crate::api::leave_balance::balance_history,

        crate::api::notification::list_notifications,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read,
        crate::api::notification::delete_notification,

        crate::api::department::create_department,
        crate::api::department::list_departments,
        crate::api::department::get_department,
        crate::api::department::update_department,
        crate::api::department::delete_department,

        crate::api::project::create_project,
        crate::api::project::list_projects,
        crate::api::project::get_project,
        crate::api::project::update_project,
        crate::api::project::delete_project,
        crate::api::project::list_project_tasks,

        crate::api::task::create_task,
        crate::api::task::list_tasks,
        crate::api::task::get_task,
        crate::api::task::update_task,
        crate::api::task::update_task_progress,
        crate::api::task::delete_task,

        crate::api::qcm::create_qcm,
        crate::api::qcm::list_qcms,
        crate::api::qcm::get_qcm,
        crate::api::qcm::delete_qcm,
        crate::api::qcm::submit_qcm,
        crate::api::qcm::qcm_results,

        crate::api::presence::check_in,
        crate::api::presence::check_out,
        crate::api::presence::list_presence,

        crate::api::evaluation::create_evaluation,
        crate::api::evaluation::list_evaluations,
        crate::api::evaluation::get_evaluation,
        crate::api::evaluation::update_evaluation,
        crate::api::evaluation::delete_evaluation,

        crate::api::maintenance::get_maintenance,
        crate::api::maintenance::set_maintenance,

        crate::api::message::send_message,
        crate::api::message::list_messages,
        crate::api::message::mark_message_read,
        crate::api::message::delete_message
    ),
    components(
        schemas(
            LoginReqDto,
            ChangePasswordDto,
            TokenPair,
            Role,
            Employee,
            EmployeeStatus,
            CreateEmployee,
            UpdateEmployee,
            EmployeeQuery,
            EmployeeListResponse,
            Conge,
            CongeDocument,
            LeaveType,
            LeaveStatus,
            CreateConge,
            UpdateConge,
            DecisionBody,
            CongeFilter,
            CongeListResponse,
            LeaveBalance,
            LeaveHistoryEntry,
            HistoryKind,
            AdjustBalance,
            Notification,
            Department,
            DepartmentPayload,
            Project,
            ProjectStatus,
            ProjectPayload,
            ProjectListResponse,
            Task,
            TaskStatus,
            CreateTask,
            UpdateTask,
            TaskProgress,
            Qcm,
            QcmQuestion,
            QcmSubmission,
            QcmDetail,
            CreateQcm,
            SubmitAnswers,
            Presence,
            Evaluation,
            CreateEvaluation,
            UpdateEvaluation,
            MaintenanceFlag,
            SetMaintenance,
            Message,
            SendMessage
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and own account"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Conge", description = "Leave request workflow"),
        (name = "Leave balance", description = "Per-employee leave ledger"),
        (name = "Notification", description = "In-app notifications"),
        (name = "Department", description = "Department management APIs"),
        (name = "Project", description = "Projects and their progress"),
        (name = "Task", description = "Project tasks"),
        (name = "QCM", description = "Multiple-choice questionnaires"),
        (name = "Presence", description = "Daily check-in and check-out"),
        (name = "Evaluation", description = "Employee evaluations"),
        (name = "Maintenance", description = "Global maintenance switch"),
        (name = "Message", description = "Direct messages between employees"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_the_leave_workflow_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/conges/{id}/approve"));
        assert!(doc.paths.paths.contains_key("/api/leave-balances/{employee_id}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
