//! Service-driven verification of a managed firewall.
//!
//! The verifier derives expectations from the services the orchestration
//! platform exposes and checks them in three stages:
//!
//! - **Config**: each service has an application object with the right
//!   destination port ([`stages::config`])
//! - **Operational**: the device reaches each service and reports the
//!   expected facts ([`stages::operational`])
//! - **Traffic**: measurement agents get HTTP 200 from each service
//!   ([`stages::traffic`])
//!
//! [`Verifier`] runs one stage per call. Each run is independent: it takes a
//! fresh inventory snapshot and keeps no state afterwards.

pub mod compliance;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod output;
pub mod policy;
pub mod runner;
pub mod stages;

pub use config::Config;
pub use error::VerifyError;
pub use runner::Verifier;
