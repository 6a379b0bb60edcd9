//! Compliance-reporting boundary.
//!
//! The compliance document is an ordered list of statements. Reachability
//! statements run a strict-mode ping that must show zero packet loss; the
//! device-facts statement matches reported facts, where an empty string
//! accepts any value and a `list` block must match exactly.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use netverify_assertions::OperationalAssertion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::DeviceRef;
use crate::error::VerifyError;
use crate::http;

const BACKEND: &str = "compliance reporter";

/// One statement of the compliance document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatement {
    Ping(PingStatement),
    GetFacts(FactsStatement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingStatement {
    #[serde(rename = "_name")]
    pub name: String,
    #[serde(rename = "_kwargs")]
    pub kwargs: PingArgs,
    pub success: PingSuccess,
    #[serde(rename = "_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingArgs {
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingSuccess {
    pub packet_loss: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactsStatement {
    /// Empty string matches any version.
    pub os_version: String,
    pub interface_list: ExactList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExactList {
    pub list: Vec<String>,
}

impl ComplianceStatement {
    pub fn for_assertion(assertion: &OperationalAssertion) -> Self {
        match assertion {
            OperationalAssertion::Reachability { target, .. } => {
                ComplianceStatement::Ping(PingStatement {
                    name: assertion.statement_name(),
                    kwargs: PingArgs {
                        destination: target.clone(),
                    },
                    success: PingSuccess { packet_loss: 0 },
                    mode: "strict".to_string(),
                })
            }
            OperationalAssertion::DeviceFact {
                os_version,
                interfaces,
            } => ComplianceStatement::GetFacts(FactsStatement {
                os_version: os_version.clone().unwrap_or_default(),
                interface_list: ExactList {
                    list: interfaces.clone(),
                },
            }),
        }
    }
}

/// Compliance report. `complies` at the root decides the outcome; the rest
/// is per-statement detail keyed by statement name.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ComplianceReport {
    pub complies: bool,
    #[serde(flatten)]
    pub statements: BTreeMap<String, serde_json::Value>,
}

impl ComplianceReport {
    /// Detail for one statement, if the reporter returned any.
    pub fn statement(&self, name: &str) -> Option<&serde_json::Value> {
        self.statements.get(name)
    }

    /// The statement's own `complies` flag, if reported.
    pub fn statement_complies(&self, name: &str) -> Option<bool> {
        self.statement(name)
            .and_then(|detail| detail.get("complies"))
            .and_then(serde_json::Value::as_bool)
    }
}

/// Reporter that evaluates a compliance document on the device.
#[async_trait]
pub trait ComplianceReporter: Send + Sync {
    async fn compliance_report(
        &self,
        document: &[ComplianceStatement],
    ) -> Result<ComplianceReport, VerifyError>;
}

/// Reporter reached through the checker gateway.
#[derive(Debug, Clone)]
pub struct HttpComplianceReporter {
    client: reqwest::Client,
    base_url: String,
    device: DeviceRef,
}

impl HttpComplianceReporter {
    pub fn new(base_url: &str, device: DeviceRef, timeout: Duration) -> Result<Self, VerifyError> {
        Ok(Self {
            client: http::build_client(BACKEND, timeout)?,
            base_url: base_url.to_string(),
            device,
        })
    }
}

#[derive(Serialize)]
struct ComplianceRequest<'a> {
    device: &'a DeviceRef,
    validation_source: &'a [ComplianceStatement],
}

#[async_trait]
impl ComplianceReporter for HttpComplianceReporter {
    async fn compliance_report(
        &self,
        document: &[ComplianceStatement],
    ) -> Result<ComplianceReport, VerifyError> {
        debug!(
            statements = document.len(),
            device = %self.device.host,
            "Requesting compliance report"
        );

        let request = ComplianceRequest {
            device: &self.device,
            validation_source: document,
        };
        http::post_json(
            &self.client,
            BACKEND,
            &http::join(&self.base_url, "/compliance"),
            &request,
        )
        .await
    }
}
