//! Error types for verification runs.

use netverify_assertions::{BuildError, Stage, StageFailure};
use netverify_barrier::BarrierError;
use netverify_inventory::InventoryError;
use thiserror::Error;

/// Verification errors. Every variant ends the current run.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The inventory could not be fetched. Retrying the whole run may help.
    #[error("inventory: {0}")]
    Inventory(#[from] InventoryError),

    /// Inventory data could not be turned into assertions.
    #[error("assertion build failed: {0}")]
    AssertionBuild(#[from] BuildError),

    /// Device configuration does not match the inventory.
    #[error("config mismatch for service {service}: {detail}")]
    ConfigMismatch { service: String, detail: String },

    /// The compliance report did not comply.
    #[error("compliance check failed: {detail}")]
    ComplianceCheck { detail: String },

    /// The load-test coordinator rejected an object definition.
    #[error("coordinator rejected object {label} (status {status}): {body}")]
    ObjectRegistration {
        label: String,
        status: u16,
        body: String,
    },

    /// The load-test coordinator refused to start a test run.
    #[error("coordinator failed to run {label} (status {status}): {body}")]
    TestTrigger {
        label: String,
        status: u16,
        body: String,
    },

    /// An agent could not reach a service over HTTP.
    #[error("traffic assertion failed for service {service}: {detail}")]
    TrafficAssertion { service: String, detail: String },

    /// A polling barrier timed out or was cancelled.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// A back-end request did not complete.
    #[error("{backend} request failed: {source}")]
    Transport {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A back end answered with an unexpected status.
    #[error("{backend} returned {status}: {body}")]
    Backend {
        backend: &'static str,
        status: u16,
        body: String,
    },

    /// A back-end response could not be decoded.
    #[error("{backend} response could not be decoded: {detail}")]
    Decode {
        backend: &'static str,
        detail: String,
    },

    /// Device session failure.
    #[error("device session: {0}")]
    Device(String),
}

impl VerifyError {
    pub fn transport(backend: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { backend, source }
    }

    /// Stable reason code for logs and exit summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            VerifyError::Inventory(_) => "inventory_source_error",
            VerifyError::AssertionBuild(_) => "assertion_build_error",
            VerifyError::ConfigMismatch { .. } => "config_mismatch",
            VerifyError::ComplianceCheck { .. } => "compliance_check_failed",
            VerifyError::ObjectRegistration { .. } => "object_registration_failed",
            VerifyError::TestTrigger { .. } => "test_trigger_failed",
            VerifyError::TrafficAssertion { .. } => "traffic_assertion_failed",
            VerifyError::Barrier(BarrierError::Timeout { .. }) => "barrier_timeout",
            VerifyError::Barrier(BarrierError::Cancelled { .. }) => "cancelled",
            VerifyError::Transport { .. } => "transport_error",
            VerifyError::Backend { .. } => "backend_error",
            VerifyError::Decode { .. } => "decode_error",
            VerifyError::Device(_) => "device_error",
        }
    }

    /// Whether re-running the whole verification might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::Inventory(
                InventoryError::Unreachable(_) | InventoryError::Status { .. }
            ) | VerifyError::Transport { .. }
        )
    }
}

impl From<StageFailure> for VerifyError {
    fn from(failure: StageFailure) -> Self {
        let StageFailure {
            stage,
            subject,
            detail,
            failed,
            total,
        } = failure;

        match stage {
            Stage::Config => VerifyError::ConfigMismatch {
                service: subject,
                detail,
            },
            Stage::Operational => VerifyError::ComplianceCheck {
                detail: format!("{subject}: {detail} ({failed} of {total} statements failed)"),
            },
            Stage::Traffic => VerifyError::TrafficAssertion {
                service: subject,
                detail,
            },
        }
    }
}
