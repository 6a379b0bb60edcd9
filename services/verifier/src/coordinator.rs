//! Load-test coordinator API client.
//!
//! Provides methods for:
//! - Registering agent groups and test-run definitions
//! - Reading current agent group membership
//! - Starting test runs
//! - Fetching test-run results

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::VerifyError;
use crate::http;

const BACKEND: &str = "coordinator";

/// Object definition accepted by `POST /object/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinatorObject {
    Group { label: String, spec: GroupSpec },
    Testrun { label: String, spec: TestRunSpec },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSpec {
    pub group: String,
    pub matches: Vec<GroupMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMatch {
    /// Regular expression over agent hostnames.
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRunSpec {
    pub targettype: String,
    pub source: TestRunSource,
    pub target: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRunSource {
    pub name: String,
    pub app: String,
    pub args: String,
}

impl CoordinatorObject {
    /// Group of agents whose hostname matches `hostname_pattern`.
    pub fn group(label: &str, hostname_pattern: &str) -> Self {
        CoordinatorObject::Group {
            label: label.to_string(),
            spec: GroupSpec {
                group: label.to_string(),
                matches: vec![GroupMatch {
                    hostname: hostname_pattern.to_string(),
                }],
            },
        }
    }

    /// HTTP probe from every agent of `group` to an uncontrolled `target`.
    pub fn http_testrun(label: &str, group: &str, target: &str) -> Self {
        CoordinatorObject::Testrun {
            label: label.to_string(),
            spec: TestRunSpec {
                targettype: "uncontrolled".to_string(),
                source: TestRunSource {
                    name: group.to_string(),
                    app: "http".to_string(),
                    args: String::new(),
                },
                target: vec![target.to_string()],
            },
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CoordinatorObject::Group { label, .. } | CoordinatorObject::Testrun { label, .. } => {
                label
            }
        }
    }
}

/// Metrics one agent recorded for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    /// HTTP status as reported (expected to be a string).
    #[serde(default)]
    pub http_code: Option<serde_json::Value>,

    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// Targets reported by one agent; `None` when the agent sent `null`.
pub type AgentTargets = Option<BTreeMap<String, TargetMetrics>>;

/// Test-run results keyed by agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestReport {
    pub agents: BTreeMap<String, AgentTargets>,
}

/// Coordinator API client.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    /// Create a new client. `base_url` includes the API version prefix.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VerifyError> {
        Ok(Self {
            client: http::build_client(BACKEND, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Register a group or test-run definition.
    pub async fn create_object(&self, object: &CoordinatorObject) -> Result<(), VerifyError> {
        let url = http::join(&self.base_url, "/object/create");
        debug!(label = %object.label(), "Registering coordinator object");

        let response = self
            .client
            .post(&url)
            .json(object)
            .send()
            .await
            .map_err(VerifyError::transport(BACKEND))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(label = %object.label(), status = %status, body = %body, "Object registration failed");
            return Err(VerifyError::ObjectRegistration {
                label: object.label().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Count agents currently placed in `group`.
    pub async fn group_members(&self, group: &str) -> Result<usize, VerifyError> {
        let url = http::join(&self.base_url, "/groups");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(VerifyError::transport(BACKEND))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Backend {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            });
        }

        let membership: serde_json::Value =
            response.json().await.map_err(|e| VerifyError::Decode {
                backend: BACKEND,
                detail: e.to_string(),
            })?;

        Ok(count_members(&membership, group))
    }

    /// Start a registered test run and return its run ID.
    pub async fn run_testrun(&self, label: &str) -> Result<String, VerifyError> {
        let url = http::join(&self.base_url, "/testrun/run");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "testRunName": label }))
            .send()
            .await
            .map_err(VerifyError::transport(BACKEND))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(label, status = %status, body = %body, "Test run trigger failed");
            return Err(VerifyError::TestTrigger {
                label: label.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let run_id = body.trim().trim_matches('"').to_string();
        if run_id.is_empty() {
            return Err(VerifyError::TestTrigger {
                label: label.to_string(),
                status: status.as_u16(),
                body: "empty test run id".to_string(),
            });
        }

        Ok(run_id)
    }

    /// Fetch results for a run. `None` while the coordinator still answers
    /// 404.
    pub async fn test_data(&self, run_id: &str) -> Result<Option<TestReport>, VerifyError> {
        let url = http::join(&self.base_url, "/testdata");

        let response = self
            .client
            .get(&url)
            .query(&[("testUuid", run_id)])
            .send()
            .await
            .map_err(VerifyError::transport(BACKEND))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Backend {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            });
        }

        let report = response.json().await.map_err(|e| VerifyError::Decode {
            backend: BACKEND,
            detail: format!("test data for {run_id}: {e}"),
        })?;
        Ok(Some(report))
    }
}

/// Count agents in `group`.
///
/// The membership document maps agent IDs to their group (or list of
/// groups); a bare list is taken as the member list itself.
fn count_members(membership: &serde_json::Value, group: &str) -> usize {
    use serde_json::Value;

    match membership {
        Value::Object(agents) => agents
            .values()
            .filter(|assigned| match assigned {
                Value::String(name) => name == group,
                Value::Array(names) => names.iter().any(|n| n.as_str() == Some(group)),
                _ => false,
            })
            .count(),
        Value::Array(members) => members.len(),
        _ => 0,
    }
}
