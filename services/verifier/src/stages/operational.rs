//! Operational stage: reachability pings and device facts, evaluated as one
//! compliance document.

use netverify_assertions::{Assertion, OperationalAssertion, StageResult};
use tracing::info;

use crate::compliance::{ComplianceReport, ComplianceReporter, ComplianceStatement};
use crate::error::VerifyError;

/// Operational stage executor.
pub struct OperationalCheck<'a> {
    reporter: &'a dyn ComplianceReporter,
}

impl<'a> OperationalCheck<'a> {
    pub fn new(reporter: &'a dyn ComplianceReporter) -> Self {
        Self { reporter }
    }

    pub async fn run(
        &self,
        assertions: &[OperationalAssertion],
    ) -> Result<Vec<StageResult>, VerifyError> {
        let document: Vec<ComplianceStatement> = assertions
            .iter()
            .map(ComplianceStatement::for_assertion)
            .collect();

        let report = self.reporter.compliance_report(&document).await?;
        info!(
            statements = document.len(),
            complies = report.complies,
            "Compliance report received"
        );

        Ok(evaluate(assertions, &report))
    }
}

/// Per-statement results. The report's root `complies` flag is
/// authoritative: the verdict passes exactly when it is true.
pub fn evaluate(assertions: &[OperationalAssertion], report: &ComplianceReport) -> Vec<StageResult> {
    let detail_for = |assertion: &OperationalAssertion| {
        let name = assertion.statement_name();
        match report.statement(&name) {
            Some(detail) => format!("{name}: {detail}"),
            None => format!("{name}: no detail reported"),
        }
    };

    if report.complies {
        return assertions
            .iter()
            .map(|a| StageResult::pass(Assertion::Operational(a.clone()), detail_for(a)))
            .collect();
    }

    let statement_passed: Vec<bool> = assertions
        .iter()
        .map(|a| report.statement_complies(&a.statement_name()) == Some(true))
        .collect();

    // Root says no but no statement owns the failure: fail all of them.
    let blame_all = statement_passed.iter().all(|passed| *passed);

    assertions
        .iter()
        .zip(statement_passed)
        .map(|(a, passed)| {
            let subject = Assertion::Operational(a.clone());
            if blame_all {
                StageResult::fail(
                    subject,
                    format!("report does not comply ({})", detail_for(a)),
                )
            } else if passed {
                StageResult::pass(subject, detail_for(a))
            } else {
                StageResult::fail(subject, detail_for(a))
            }
        })
        .collect()
}
