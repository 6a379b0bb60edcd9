//! Verification runner.
//!
//! One run: snapshot the inventory, build the stage's assertions, execute
//! them, and aggregate the verdict. Nothing is carried from one run to the
//! next.

use std::sync::Arc;

use netverify_assertions::{aggregate, AssertionBuilder, RunVerdict, Stage, VerdictSummary};
use netverify_inventory::{InventorySource, KubernetesInventory, ServiceEndpoint};
use tokio::sync::watch;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::compliance::{ComplianceReporter, HttpComplianceReporter};
use crate::config::Config;
use crate::coordinator::CoordinatorClient;
use crate::device::{apply_candidate, DeviceDriver, DeviceRef};
use crate::engine::{ConfigAssertionEngine, HttpConfigEngine};
use crate::error::VerifyError;
use crate::policy::render_policies;
use crate::stages::{ConfigCheck, OperationalCheck, TrafficCheck, TrafficSettings};

/// Orchestrates verification runs against the configured back ends.
pub struct Verifier {
    inventory: Arc<dyn InventorySource>,
    builder: AssertionBuilder,
    engine: Arc<dyn ConfigAssertionEngine>,
    reporter: Arc<dyn ComplianceReporter>,
    coordinator: CoordinatorClient,
    traffic: TrafficSettings,
    cancel: Option<watch::Receiver<bool>>,
}

impl Verifier {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        builder: AssertionBuilder,
        engine: Arc<dyn ConfigAssertionEngine>,
        reporter: Arc<dyn ComplianceReporter>,
        coordinator: CoordinatorClient,
        traffic: TrafficSettings,
    ) -> Self {
        Self {
            inventory,
            builder,
            engine,
            reporter,
            coordinator,
            traffic,
            cancel: None,
        }
    }

    /// Wire the HTTP back ends described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, VerifyError> {
        let device = DeviceRef::from(&config.device);

        Ok(Self::new(
            Arc::new(KubernetesInventory::connect(&config.kube).await?),
            AssertionBuilder::new(config.build_context()),
            Arc::new(HttpConfigEngine::new(
                &config.checker_url,
                device.clone(),
                config.http_timeout,
            )?),
            Arc::new(HttpComplianceReporter::new(
                &config.checker_url,
                device,
                config.http_timeout,
            )?),
            CoordinatorClient::new(&config.coordinator_url, config.http_timeout)?,
            config.traffic.clone(),
        ))
    }

    /// Abort barrier waits when the signal flips to `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run `stage` and return the verdict, passed or not.
    pub async fn verify(&self, stage: Stage) -> Result<RunVerdict, VerifyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("verification", %run_id, %stage);

        async move {
            info!("Starting verification run");

            let endpoints = self.snapshot().await?;
            let assertions = self.builder.build(stage, &endpoints)?;

            let results = match stage {
                Stage::Config => {
                    let typed: Vec<_> = assertions
                        .iter()
                        .filter_map(|a| a.as_config().cloned())
                        .collect();
                    ConfigCheck::new(self.engine.as_ref()).run(&typed).await?
                }
                Stage::Operational => {
                    let typed: Vec<_> = assertions
                        .iter()
                        .filter_map(|a| a.as_operational().cloned())
                        .collect();
                    OperationalCheck::new(self.reporter.as_ref()).run(&typed).await?
                }
                Stage::Traffic => {
                    let typed: Vec<_> = assertions
                        .iter()
                        .filter_map(|a| a.as_traffic().cloned())
                        .collect();
                    TrafficCheck::new(&self.coordinator, &self.traffic)
                        .with_cancel(self.cancel.clone())
                        .run(&typed)
                        .await?
                }
            };

            let verdict = aggregate(stage, results);
            info!(
                assertions = verdict.results.len(),
                failed = verdict.failed_count(),
                overall_pass = verdict.overall_pass,
                "Verification run finished"
            );
            Ok(verdict)
        }
        .instrument(span)
        .await
    }

    /// Run `stage`; a failed verdict becomes the stage's error.
    pub async fn run(&self, stage: Stage) -> Result<VerdictSummary, VerifyError> {
        let verdict = self.verify(stage).await?;
        Ok(verdict.summary()?)
    }

    /// Push one application object and permit policy per exposed service.
    /// Returns the number of services covered.
    pub async fn configure_policies(&self, driver: &dyn DeviceDriver) -> Result<usize, VerifyError> {
        let endpoints = self.snapshot().await?;
        apply_candidate(driver, &render_policies(&endpoints)).await?;
        info!(services = endpoints.len(), "Service policies committed");
        Ok(endpoints.len())
    }

    async fn snapshot(&self) -> Result<Vec<ServiceEndpoint>, VerifyError> {
        let endpoints = netverify_inventory::fetch(self.inventory.as_ref()).await?;
        if endpoints.is_empty() {
            warn!("Inventory has no exposed services; the run checks nothing");
        }
        Ok(endpoints)
    }
}
