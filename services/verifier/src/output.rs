//! Output formatting for the `netverify` binary.

use std::str::FromStr;

use colored::Colorize;
use netverify_assertions::{RunVerdict, VerdictSummary};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::VerifyError;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?} (expected table or json)")),
        }
    }
}

/// One table row per assertion.
#[derive(Debug, Serialize, Tabled)]
pub struct ResultRow {
    #[tabled(rename = "SUBJECT")]
    pub subject: String,
    #[tabled(rename = "ASSERTION")]
    pub assertion: String,
    #[tabled(rename = "RESULT")]
    pub result: &'static str,
    #[tabled(rename = "DETAIL")]
    pub detail: String,
}

/// Table rows for a verdict, in assertion order.
pub fn result_rows(verdict: &RunVerdict) -> Vec<ResultRow> {
    verdict
        .results
        .iter()
        .map(|r| ResultRow {
            subject: r.assertion.subject().to_string(),
            assertion: r.assertion.to_string(),
            result: if r.passed { "PASS" } else { "FAIL" },
            detail: r.detail.clone(),
        })
        .collect()
}

/// Print a verdict in the specified format.
pub fn print_verdict(verdict: &RunVerdict, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if verdict.results.is_empty() {
                println!("{}", "No assertions to check.".dimmed());
            } else {
                println!("{}", Table::new(result_rows(verdict)));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(verdict).unwrap_or_else(|_| "{}".to_string());
            println!("{json}");
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// One-line description of a passed run.
pub fn summary_message(summary: &VerdictSummary) -> String {
    format!(
        "{} stage verified {} assertion(s) at {}",
        summary.stage,
        summary.verified,
        summary.evaluated_at.to_rfc3339()
    )
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let Some(verify_err) = err.downcast_ref::<VerifyError>() else {
        return;
    };

    eprintln!("{} {}", "Reason:".dimmed(), verify_err.reason_code());
    if let Some(hint) = hint(verify_err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &VerifyError) -> Option<&'static str> {
    match err {
        VerifyError::AssertionBuild(netverify_assertions::BuildError::MissingTargetHost {
            ..
        }) => Some("Set NETVERIFY_TARGET_HOST or pass --target-host."),
        VerifyError::Barrier(netverify_barrier::BarrierError::Timeout { .. }) => Some(
            "Raise NETVERIFY_AGENT_WAIT_TIMEOUT_SECS or NETVERIFY_RESULT_WAIT_TIMEOUT_SECS, or check the agents.",
        ),
        VerifyError::ConfigMismatch { .. } => {
            Some("Run `netverify configure policy` to push the service policies.")
        }
        VerifyError::Inventory(netverify_inventory::InventoryError::Config(_)) => {
            Some("Check KUBECONFIG or set NETVERIFY_KUBE_API_URL.")
        }
        _ if err.is_retryable() => Some("The failure looks transient; re-running may succeed."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use netverify_assertions::{aggregate, Assertion, Stage, StageResult, TrafficAssertion};

    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_result_rows() {
        let assertion = Assertion::Traffic(TrafficAssertion {
            service_name: "web".to_string(),
            target_host: "minikubeip".to_string(),
            target_port: 30080,
        });
        let verdict = aggregate(
            Stage::Traffic,
            vec![StageResult::fail(assertion, "agent1 reported no targets")],
        );

        let rows = result_rows(&verdict);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject, "web");
        assert_eq!(rows[0].result, "FAIL");
        assert_eq!(rows[0].assertion, "HTTP 200 from minikubeip:30080 on every agent");
    }

    #[test]
    fn test_hint_for_missing_kubeconfig() {
        let err = VerifyError::from(netverify_inventory::InventoryError::Config(
            "no usable kubeconfig".to_string(),
        ));
        assert!(hint(&err).unwrap().contains("KUBECONFIG"));
    }

    #[test]
    fn test_hint_for_missing_target_host() {
        let err = VerifyError::AssertionBuild(netverify_assertions::BuildError::MissingTargetHost {
            stage: Stage::Traffic,
        });
        assert!(hint(&err).unwrap().contains("--target-host"));
    }
}
