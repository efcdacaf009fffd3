/// Monitoring engine module - decides and executes checks
///
/// This module is responsible for:
/// - Tracking when each assignment is next due
/// - Executing HTTP/API, DNS, TCP and TLS certificate checks
/// - Grading raw network results into pass/fail outcomes
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use executor::{CheckExecutor, MonitoringExecutor};
pub use scheduler::MonitoringScheduler;
pub use types::{Assignment, CheckOutcome};
