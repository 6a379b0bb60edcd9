//! Assertion model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::naming;

/// Verification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Declarative configuration checks.
    Config,
    /// Reachability and device-fact compliance checks.
    Operational,
    /// End-to-end HTTP traffic checks.
    Traffic,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Operational => "operational",
            Stage::Traffic => "traffic",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(Stage::Config),
            "operational" => Ok(Stage::Operational),
            "traffic" => Ok(Stage::Traffic),
            other => Err(format!(
                "unknown stage {other:?} (expected config, operational, or traffic)"
            )),
        }
    }
}

/// The device must declare an application object for the service whose
/// destination port equals the service's external port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAssertion {
    pub service_name: String,
    pub expected_port: u16,
}

impl ConfigAssertion {
    /// Name of the application object this assertion inspects.
    pub fn application_name(&self) -> String {
        naming::application_name(&self.service_name)
    }

    /// Name of the test definition submitted for this assertion.
    pub fn test_name(&self) -> String {
        naming::config_test_name(&self.service_name)
    }
}

/// Kind of operational assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalKind {
    Reachability,
    DeviceFact,
}

/// Statement name the compliance report uses for device facts.
pub const DEVICE_FACTS_STATEMENT: &str = "get_facts";

/// Operational expectation about the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationalAssertion {
    /// The device reaches `target` with zero packet loss.
    Reachability { subject: String, target: String },

    /// Device metadata matches. `os_version: None` accepts any version;
    /// the interface inventory must match exactly.
    DeviceFact {
        os_version: Option<String>,
        interfaces: Vec<String>,
    },
}

impl OperationalAssertion {
    pub fn kind(&self) -> OperationalKind {
        match self {
            Self::Reachability { .. } => OperationalKind::Reachability,
            Self::DeviceFact { .. } => OperationalKind::DeviceFact,
        }
    }

    /// Name of the compliance statement that carries this assertion.
    pub fn statement_name(&self) -> String {
        match self {
            Self::Reachability { subject, .. } => naming::ping_statement_name(subject),
            Self::DeviceFact { .. } => DEVICE_FACTS_STATEMENT.to_string(),
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Self::Reachability { subject, .. } => subject,
            Self::DeviceFact { .. } => "device",
        }
    }
}

/// Every registered measurement agent must get an HTTP 200 from the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficAssertion {
    pub service_name: String,
    pub target_host: String,
    pub target_port: u16,
}

impl TrafficAssertion {
    /// `host:port` as the load-test coordinator expects it.
    pub fn target(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    /// Label of the test run registered for this assertion.
    pub fn testrun_label(&self) -> String {
        naming::testrun_label(&self.service_name)
    }
}

/// A single expected fact, tied to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Assertion {
    Config(ConfigAssertion),
    Operational(OperationalAssertion),
    Traffic(TrafficAssertion),
}

impl Assertion {
    pub fn stage(&self) -> Stage {
        match self {
            Assertion::Config(_) => Stage::Config,
            Assertion::Operational(_) => Stage::Operational,
            Assertion::Traffic(_) => Stage::Traffic,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigAssertion> {
        match self {
            Assertion::Config(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_operational(&self) -> Option<&OperationalAssertion> {
        match self {
            Assertion::Operational(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_traffic(&self) -> Option<&TrafficAssertion> {
        match self {
            Assertion::Traffic(a) => Some(a),
            _ => None,
        }
    }

    /// The service (or other subject) this assertion is about.
    pub fn subject(&self) -> &str {
        match self {
            Assertion::Config(a) => &a.service_name,
            Assertion::Operational(a) => a.subject(),
            Assertion::Traffic(a) => &a.service_name,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Config(a) => write!(
                f,
                "application {} has destination-port {}",
                a.application_name(),
                a.expected_port
            ),
            Assertion::Operational(OperationalAssertion::Reachability { target, .. }) => {
                write!(f, "{target} reachable with 0% packet loss")
            }
            Assertion::Operational(OperationalAssertion::DeviceFact { interfaces, .. }) => {
                write!(f, "device interfaces are [{}]", interfaces.join(", "))
            }
            Assertion::Traffic(a) => write!(f, "HTTP 200 from {} on every agent", a.target()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_round_trip() {
        for stage in [Stage::Config, Stage::Operational, Stage::Traffic] {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
        assert!("rollback".parse::<Stage>().is_err());
    }

    #[test]
    fn test_assertion_serialization_is_tagged() {
        let assertion = Assertion::Config(ConfigAssertion {
            service_name: "web".to_string(),
            expected_port: 30080,
        });

        let json = serde_json::to_value(&assertion).unwrap();
        assert_eq!(json["stage"], "config");
        assert_eq!(json["service_name"], "web");
        assert_eq!(json["expected_port"], 30080);
    }

    #[test]
    fn test_operational_statement_names() {
        let ping = OperationalAssertion::Reachability {
            subject: "web".to_string(),
            target: "192.168.49.2".to_string(),
        };
        let facts = OperationalAssertion::DeviceFact {
            os_version: None,
            interfaces: vec!["ge-0/0/0".to_string()],
        };

        assert_eq!(ping.statement_name(), "pingtest_web");
        assert_eq!(ping.kind(), OperationalKind::Reachability);
        assert_eq!(facts.statement_name(), "get_facts");
        assert_eq!(facts.kind(), OperationalKind::DeviceFact);
    }

    #[test]
    fn test_traffic_target_format() {
        let assertion = TrafficAssertion {
            service_name: "web".to_string(),
            target_host: "minikubeip".to_string(),
            target_port: 30080,
        };
        assert_eq!(assertion.target(), "minikubeip:30080");
        assert_eq!(assertion.testrun_label(), "test-web");
    }
}
