//! Assertion builder.
//!
//! Turns the inventory snapshot into the ordered assertion set for a stage.
//! Output is sorted by service name so repeated runs over the same inventory
//! produce identical diagnostics.

use std::collections::BTreeSet;
use std::str::FromStr;

use netverify_inventory::ServiceEndpoint;
use thiserror::Error;
use tracing::debug;

use crate::assertion::{
    Assertion, ConfigAssertion, OperationalAssertion, Stage, TrafficAssertion,
};

/// Assertion build errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("duplicate service name {0:?} in inventory")]
    DuplicateService(String),

    #[error("{stage} stage requires a target host")]
    MissingTargetHost { stage: Stage },

    #[error("invalid reachability target {0:?} (expected name=host)")]
    InvalidReachabilityTarget(String),
}

/// A fixed reachability check that is not tied to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityTarget {
    pub name: String,
    pub host: String,
}

impl FromStr for ReachabilityTarget {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::InvalidReachabilityTarget(s.to_string());
        let (name, host) = s.split_once('=').ok_or_else(invalid)?;
        let (name, host) = (name.trim(), host.trim());
        if name.is_empty() || host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            host: host.to_string(),
        })
    }
}

/// Environment facts the builder needs besides the inventory.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Address where service ports are exposed.
    pub target_host: Option<String>,

    /// Extra reachability checks appended to the operational stage.
    pub extra_reachability: Vec<ReachabilityTarget>,

    /// Exact interface inventory expected on the device.
    pub expected_interfaces: Vec<String>,
}

/// Builds per-stage assertions from the inventory.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    context: BuildContext,
}

impl AssertionBuilder {
    pub fn new(context: BuildContext) -> Self {
        Self { context }
    }

    /// Build the assertions for `stage`.
    pub fn build(
        &self,
        stage: Stage,
        endpoints: &[ServiceEndpoint],
    ) -> Result<Vec<Assertion>, BuildError> {
        let endpoints = sorted_unique(endpoints)?;

        let assertions: Vec<Assertion> = match stage {
            Stage::Config => endpoints
                .iter()
                .map(|e| {
                    Assertion::Config(ConfigAssertion {
                        service_name: e.name.clone(),
                        expected_port: e.port,
                    })
                })
                .collect(),
            Stage::Operational => {
                let host = self.target_host(stage)?;
                let per_service = endpoints.iter().map(|e| OperationalAssertion::Reachability {
                    subject: e.name.clone(),
                    target: host.to_string(),
                });
                let extra =
                    self.context
                        .extra_reachability
                        .iter()
                        .map(|t| OperationalAssertion::Reachability {
                            subject: t.name.clone(),
                            target: t.host.clone(),
                        });
                let facts = OperationalAssertion::DeviceFact {
                    os_version: None,
                    interfaces: self.context.expected_interfaces.clone(),
                };

                per_service
                    .chain(extra)
                    .chain(std::iter::once(facts))
                    .map(Assertion::Operational)
                    .collect()
            }
            Stage::Traffic => {
                let host = self.target_host(stage)?;
                endpoints
                    .iter()
                    .map(|e| {
                        Assertion::Traffic(TrafficAssertion {
                            service_name: e.name.clone(),
                            target_host: host.to_string(),
                            target_port: e.port,
                        })
                    })
                    .collect()
            }
        };

        debug!(
            stage = %stage,
            services = endpoints.len(),
            assertions = assertions.len(),
            "Built assertions"
        );

        Ok(assertions)
    }

    fn target_host(&self, stage: Stage) -> Result<&str, BuildError> {
        self.context
            .target_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or(BuildError::MissingTargetHost { stage })
    }
}

fn sorted_unique(endpoints: &[ServiceEndpoint]) -> Result<Vec<&ServiceEndpoint>, BuildError> {
    let mut seen = BTreeSet::new();
    for endpoint in endpoints {
        if endpoint.name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if !seen.insert(endpoint.name.as_str()) {
            return Err(BuildError::DuplicateService(endpoint.name.clone()));
        }
    }

    let mut sorted: Vec<&ServiceEndpoint> = endpoints.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sorted)
}
