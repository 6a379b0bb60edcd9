//! Stage executors.
//!
//! Each executor takes the typed assertions for its stage, drives the
//! matching back end, and returns one [`StageResult`] per assertion in
//! assertion order. Back-end and barrier failures abort with an error;
//! assertion failures are reported as failed results and turned into errors
//! by the runner.
//!
//! [`StageResult`]: netverify_assertions::StageResult

pub mod config;
pub mod operational;
pub mod traffic;

pub use config::{ConfigCheck, ConfigPhase};
pub use operational::OperationalCheck;
pub use traffic::{TrafficCheck, TrafficPhase, TrafficSettings};
