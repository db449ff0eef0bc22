pub mod conge;
pub mod department;
pub mod employee;
pub mod evaluation;
pub mod leave_balance;
pub mod maintenance;
pub mod message;
pub mod notification;
pub mod presence;
pub mod project;
pub mod qcm;
pub mod task;
