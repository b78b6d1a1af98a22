//! Application layer: running accruals and deciding when to run them.
//!
//! [`orchestrator::AccrualOrchestrator`] performs a single run against the
//! record store. [`scheduler::AccrualScheduler`] fires runs on a cron cadence
//! or on demand and keeps them from overlapping.

pub mod orchestrator;
pub mod scheduler;
