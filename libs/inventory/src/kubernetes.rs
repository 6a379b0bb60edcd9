//! Kubernetes inventory adapter.
//!
//! Lists services across all namespaces with a `kube` client and reports the
//! node port of each service's first declared port. Credentials come from the
//! kubeconfig (or the in-cluster service account) unless an explicit API
//! server URL is configured.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, error};

use crate::{InventoryError, InventorySource, ServiceRecord};

/// Connection settings for the Kubernetes API.
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// API server base URL. `None` infers the cluster from the kubeconfig
    /// or the in-cluster environment.
    pub api_url: Option<String>,

    /// Accept self-signed API server certificates (local clusters).
    pub accept_invalid_certs: bool,

    /// Connect and read timeout.
    pub timeout: Duration,
}

/// Inventory source backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubernetesInventory {
    client: Client,
}

impl KubernetesInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from `config`, loading the kubeconfig when no API
    /// server URL is given.
    pub async fn connect(config: &KubernetesConfig) -> Result<Self, InventoryError> {
        let mut kube_config = match &config.api_url {
            Some(url) => {
                let uri = url.parse().map_err(|e| {
                    InventoryError::Config(format!("invalid API server URL {url:?}: {e}"))
                })?;
                kube::Config::new(uri)
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| InventoryError::Config(format!("no usable kubeconfig: {e}")))?,
        };

        if config.accept_invalid_certs {
            kube_config.accept_invalid_certs = true;
        }
        kube_config.connect_timeout = Some(config.timeout);
        kube_config.read_timeout = Some(config.timeout);

        debug!(cluster_url = %kube_config.cluster_url, "Connecting to Kubernetes API");
        Self::from_kube_config(kube_config)
    }

    /// Build a client from an already resolved `kube` configuration.
    pub fn from_kube_config(config: kube::Config) -> Result<Self, InventoryError> {
        let client = Client::try_from(config)
            .map_err(|e| InventoryError::Config(format!("failed to build Kubernetes client: {e}")))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl InventorySource for KubernetesInventory {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, InventoryError> {
        let services: Api<Service> = Api::all(self.client.clone());

        let list = services
            .list(&ListParams::default())
            .await
            .map_err(classify)?;

        debug!(count = list.items.len(), "Listed services");
        list.items.into_iter().map(service_record).collect()
    }
}

fn classify(err: kube::Error) -> InventoryError {
    match err {
        kube::Error::Api(response) => {
            error!(status = response.code, message = %response.message, "Failed to list services");
            InventoryError::Status {
                status: response.code,
                body: response.message,
            }
        }
        kube::Error::SerdeError(e) => InventoryError::Decode(e.to_string()),
        other => InventoryError::Unreachable(other.to_string()),
    }
}

fn service_record(service: Service) -> Result<ServiceRecord, InventoryError> {
    let namespace = service.metadata.namespace;
    let Some(name) = service.metadata.name else {
        return Err(InventoryError::Malformed {
            name: namespace.unwrap_or_default(),
            reason: "service without metadata.name".to_string(),
        });
    };

    let node_port = service
        .spec
        .and_then(|spec| spec.ports)
        .and_then(|ports| ports.into_iter().next())
        .and_then(|port| port.node_port)
        .map(i64::from);

    let record = ServiceRecord::new(name, node_port);
    Ok(match namespace {
        Some(ns) => record.with_namespace(ns),
        None => record,
    })
}
