//! Configuration-assertion engine boundary.
//!
//! Test definitions stay typed until submission, where each one is rendered
//! into the engine's YAML test document (snapshot RPC, xpath selector, and
//! comparison clause).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use netverify_assertions::ConfigAssertion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::DeviceRef;
use crate::error::VerifyError;
use crate::http;

const BACKEND: &str = "config engine";

/// Result string the engine reports for a passing test.
pub const PASSED: &str = "Passed";

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    IsEqual,
}

impl Comparison {
    /// Keyword used in test documents.
    pub fn keyword(&self) -> &'static str {
        match self {
            Comparison::IsEqual => "is-equal",
        }
    }
}

/// One declarative configuration test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTestDefinition {
    /// Test name; outcomes are matched back by this name.
    pub name: String,

    /// Snapshot RPC.
    pub rpc: String,

    /// Selector for the configuration object.
    pub xpath: String,

    /// Identity path inside the selected object.
    pub id: String,

    /// Field compared inside the selected object.
    pub field: String,

    pub comparison: Comparison,

    pub expected: String,
}

impl ConfigTestDefinition {
    /// "The application object for this service has the expected
    /// destination port."
    pub fn for_assertion(assertion: &ConfigAssertion) -> Self {
        Self {
            name: assertion.test_name(),
            rpc: "get-config".to_string(),
            xpath: format!(
                "applications/application[name=\"{}\"]",
                assertion.application_name()
            ),
            id: "./name".to_string(),
            field: "destination-port".to_string(),
            comparison: Comparison::IsEqual,
            expected: assertion.expected_port.to_string(),
        }
    }

    /// Render the engine's YAML test document.
    pub fn to_document(&self) -> Result<String, VerifyError> {
        let field = &self.field;
        let mut clause = BTreeMap::new();
        clause.insert(
            self.comparison.keyword(),
            format!("{field}, {}", self.expected),
        );
        clause.insert(
            "info",
            format!("Test Succeeded!!, {field} is <{{{{post['{field}']}}}}>"),
        );
        clause.insert(
            "err",
            format!("Test Failed!!!, {field} is <{{{{post['{field}']}}}}>"),
        );

        let steps = vec![
            Step::Rpc { rpc: &self.rpc },
            Step::Item {
                item: ItemBlock {
                    id: &self.id,
                    xpath: &self.xpath,
                    tests: vec![clause],
                },
            },
        ];

        let mut document = BTreeMap::new();
        document.insert(self.name.as_str(), steps);

        serde_yaml::to_string(&document).map_err(|e| VerifyError::Decode {
            backend: BACKEND,
            detail: format!("failed to render test {}: {e}", self.name),
        })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Step<'a> {
    Rpc { rpc: &'a str },
    Item { item: ItemBlock<'a> },
}

#[derive(Serialize)]
struct ItemBlock<'a> {
    id: &'a str,
    xpath: &'a str,
    tests: Vec<BTreeMap<&'static str, String>>,
}

/// Outcome of one submitted test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub test_name: String,
    /// `"Passed"` or `"Failed"`.
    pub result: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.result == PASSED
    }
}

/// Engine that evaluates configuration tests against a device snapshot.
#[async_trait]
pub trait ConfigAssertionEngine: Send + Sync {
    /// Take a snapshot and run every test. Outcome order is not guaranteed.
    async fn snapcheck(
        &self,
        tests: &[ConfigTestDefinition],
    ) -> Result<Vec<CheckOutcome>, VerifyError>;
}

/// Engine reached through the checker gateway.
#[derive(Debug, Clone)]
pub struct HttpConfigEngine {
    client: reqwest::Client,
    base_url: String,
    device: DeviceRef,
}

impl HttpConfigEngine {
    pub fn new(base_url: &str, device: DeviceRef, timeout: Duration) -> Result<Self, VerifyError> {
        Ok(Self {
            client: http::build_client(BACKEND, timeout)?,
            base_url: base_url.to_string(),
            device,
        })
    }
}

#[derive(Serialize)]
struct SnapcheckRequest<'a> {
    device: &'a DeviceRef,
    tests: Vec<SubmittedTest<'a>>,
}

#[derive(Serialize)]
struct SubmittedTest<'a> {
    name: &'a str,
    document: String,
}

#[async_trait]
impl ConfigAssertionEngine for HttpConfigEngine {
    async fn snapcheck(
        &self,
        tests: &[ConfigTestDefinition],
    ) -> Result<Vec<CheckOutcome>, VerifyError> {
        let tests = tests
            .iter()
            .map(|t| -> Result<SubmittedTest<'_>, VerifyError> {
                Ok(SubmittedTest {
                    name: &t.name,
                    document: t.to_document()?,
                })
            })
            .collect::<Result<Vec<_>, VerifyError>>()?;

        debug!(tests = tests.len(), device = %self.device.host, "Submitting snapcheck");

        let request = SnapcheckRequest {
            device: &self.device,
            tests,
        };
        http::post_json(
            &self.client,
            BACKEND,
            &http::join(&self.base_url, "/snapcheck"),
            &request,
        )
        .await
    }
}
