pub mod conge_workflow;
pub mod ledger;
pub mod notifier;
pub mod uploads;
pub mod hierarchy;
