//! Verdict aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::assertion::{Assertion, Stage};

/// Outcome of one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub assertion: Assertion,
    pub passed: bool,
    pub detail: String,
}

impl StageResult {
    pub fn pass(assertion: Assertion, detail: impl Into<String>) -> Self {
        Self {
            assertion,
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(assertion: Assertion, detail: impl Into<String>) -> Self {
        Self {
            assertion,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVerdict {
    pub stage: Stage,
    pub results: Vec<StageResult>,
    /// True iff every result passed.
    pub overall_pass: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// A failed run: the stage and the first failing assertion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} verification failed for {subject}: {detail} ({failed} of {total} assertions failed)")]
pub struct StageFailure {
    pub stage: Stage,
    pub subject: String,
    pub detail: String,
    pub failed: usize,
    pub total: usize,
}

/// A passed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub stage: Stage,
    pub verified: usize,
    pub evaluated_at: DateTime<Utc>,
}

/// Merge a stage's results into a verdict.
pub fn aggregate(stage: Stage, results: Vec<StageResult>) -> RunVerdict {
    let overall_pass = results.iter().all(|r| r.passed);

    for failed in results.iter().filter(|r| !r.passed) {
        warn!(
            stage = %stage,
            subject = %failed.assertion.subject(),
            assertion = %failed.assertion,
            detail = %failed.detail,
            "Assertion failed"
        );
    }

    RunVerdict {
        stage,
        results,
        overall_pass,
        evaluated_at: Utc::now(),
    }
}

impl RunVerdict {
    /// First failing result, in assertion order.
    pub fn first_failure(&self) -> Option<&StageResult> {
        self.results.iter().find(|r| !r.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Summary on success, or the failure naming the first failing assertion.
    pub fn summary(&self) -> Result<VerdictSummary, StageFailure> {
        match self.first_failure() {
            None => Ok(VerdictSummary {
                stage: self.stage,
                verified: self.results.len(),
                evaluated_at: self.evaluated_at,
            }),
            Some(first) => Err(StageFailure {
                stage: self.stage,
                subject: first.assertion.subject().to_string(),
                detail: first.detail.clone(),
                failed: self.failed_count(),
                total: self.results.len(),
            }),
        }
    }
}
