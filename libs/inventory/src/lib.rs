//! Service inventory discovery.
//!
//! The inventory is the set of services the orchestration platform exposes
//! outside the cluster. Each verification run takes a fresh snapshot; nothing
//! here is cached or persisted between runs.
//!
//! A service without an externally reachable port is "not exposed". That is a
//! valid state, so such services are skipped rather than reported as errors.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod kubernetes;

pub use kubernetes::{KubernetesConfig, KubernetesInventory};

/// Inventory errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The platform could not be reached.
    #[error("inventory source unreachable: {0}")]
    Unreachable(String),

    /// The platform answered with a non-success status.
    #[error("inventory source returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("inventory response could not be decoded: {0}")]
    Decode(String),

    /// The adapter could not be configured (bad URL, missing kubeconfig).
    #[error("inventory source misconfigured: {0}")]
    Config(String),

    /// A service record is malformed.
    #[error("malformed service record {name:?}: {reason}")]
    Malformed { name: String, reason: String },

    /// Exposed services share a name across namespaces.
    #[error("service {name:?} is exposed from several namespaces ({})", .namespaces.join(", "))]
    DuplicateService { name: String, namespaces: Vec<String> },
}

/// Raw service record as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service name.
    pub name: String,

    /// Namespace the service lives in, when the platform has namespaces.
    pub namespace: Option<String>,

    /// Externally reachable port, if the service is exposed.
    pub node_port: Option<i64>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, node_port: Option<i64>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            node_port,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// An exposed service: a name plus its externally reachable port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Source of service records.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List every service the platform knows about, exposed or not.
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, InventoryError>;
}

/// Fixed inventory, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    records: Vec<ServiceRecord>,
}

impl StaticInventory {
    pub fn new(records: Vec<ServiceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, InventoryError> {
        Ok(self.records.clone())
    }
}

/// Fetch the exposed services from `source`.
pub async fn fetch(source: &dyn InventorySource) -> Result<Vec<ServiceEndpoint>, InventoryError> {
    let records = source.list_services().await?;
    let total = records.len();
    let endpoints = exposed_endpoints(records)?;

    debug!(
        total,
        exposed = endpoints.len(),
        "Fetched service inventory"
    );

    Ok(endpoints)
}

/// Convert raw records into endpoints, dropping services without a port.
///
/// Endpoint names must be unique: two exposed services with the same name in
/// different namespaces are rejected. The result is sorted by name.
pub fn exposed_endpoints(records: Vec<ServiceRecord>) -> Result<Vec<ServiceEndpoint>, InventoryError> {
    let mut by_name: BTreeMap<String, Vec<(u16, Option<String>)>> = BTreeMap::new();

    for record in records {
        if record.name.trim().is_empty() {
            return Err(InventoryError::Malformed {
                name: record.name,
                reason: "empty service name".to_string(),
            });
        }

        let Some(raw_port) = record.node_port else {
            debug!(service = %record.name, "Service has no external port, skipping");
            continue;
        };

        let port = u16::try_from(raw_port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| InventoryError::Malformed {
                name: record.name.clone(),
                reason: format!("port {raw_port} outside 1-65535"),
            })?;

        by_name
            .entry(record.name)
            .or_default()
            .push((port, record.namespace));
    }

    let mut endpoints = Vec::with_capacity(by_name.len());
    for (name, mut exposed) in by_name {
        if exposed.len() > 1 {
            let mut namespaces: Vec<String> = exposed
                .into_iter()
                .map(|(_, ns)| ns.unwrap_or_else(|| "<none>".to_string()))
                .collect();
            namespaces.sort();
            return Err(InventoryError::DuplicateService { name, namespaces });
        }

        if let Some((port, _)) = exposed.pop() {
            endpoints.push(ServiceEndpoint::new(name, port));
        }
    }

    Ok(endpoints)
}
