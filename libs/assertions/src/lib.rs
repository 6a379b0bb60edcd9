//! Assertion model for service-driven device verification.
//!
//! This library provides:
//! - The canonical naming policy shared by every stage
//! - Typed per-stage assertions
//! - The builder that derives assertions from an inventory snapshot
//! - Verdict aggregation
//!
//! # Invariants
//!
//! - Every inventory endpoint yields exactly one assertion per stage
//! - Assertion order is stable (sorted by service name)
//! - A verdict passes only if every assertion passed

pub mod assertion;
pub mod builder;
pub mod naming;
pub mod verdict;

pub use assertion::{
    Assertion, ConfigAssertion, OperationalAssertion, OperationalKind, Stage, TrafficAssertion,
    DEVICE_FACTS_STATEMENT,
};
pub use builder::{AssertionBuilder, BuildContext, BuildError, ReachabilityTarget};
pub use verdict::{aggregate, RunVerdict, StageFailure, StageResult, VerdictSummary};
