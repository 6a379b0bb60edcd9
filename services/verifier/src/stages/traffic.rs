//! Traffic stage: every measurement agent reaches every exposed service over
//! HTTP.
//!
//! The stage walks a fixed sequence of phases:
//!
//! 1. Register the agent group and one test-run definition per service.
//! 2. Wait until the group holds at least `min_agents` agents.
//! 3. Trigger every test run.
//! 4. Wait for each run's results, then evaluate them.
//!
//! Both waits are polling barriers; they are unbounded unless a timeout is
//! configured, and they honour the run's cancellation signal.

use std::fmt;
use std::time::Duration;

use netverify_assertions::{Assertion, StageResult, TrafficAssertion};
use netverify_barrier::{Barrier, Probe};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::coordinator::{CoordinatorClient, CoordinatorObject, TestReport};
use crate::error::VerifyError;

/// HTTP status every agent must report.
const EXPECTED_HTTP_CODE: &str = "200";

/// Traffic stage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSettings {
    /// Label of the agent group (also its group name).
    pub group_label: String,

    /// Hostname pattern that places agents into the group.
    pub agent_hostname_pattern: String,

    /// Agents that must be registered before tests are triggered.
    pub min_agents: usize,

    /// Pause between agent-count probes.
    pub agent_poll_interval: Duration,

    /// Pause between result probes.
    pub result_poll_interval: Duration,

    /// Upper bound on the agent wait (`None` waits forever).
    pub agent_wait_timeout: Option<Duration>,

    /// Upper bound on each result wait (`None` waits forever).
    pub result_wait_timeout: Option<Duration>,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            group_label: "bastion_agents".to_string(),
            agent_hostname_pattern: "todd-agent-.*".to_string(),
            min_agents: 6,
            agent_poll_interval: Duration::from_secs(5),
            result_poll_interval: Duration::from_secs(10),
            agent_wait_timeout: None,
            result_wait_timeout: None,
        }
    }
}

/// Progress of a traffic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPhase {
    Pending,
    GroupsDefined,
    TestsDefined,
    AwaitingAgents,
    TestsTriggered,
    AwaitingResults,
    Evaluated,
}

impl fmt::Display for TrafficPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrafficPhase::Pending => "pending",
            TrafficPhase::GroupsDefined => "groups_defined",
            TrafficPhase::TestsDefined => "tests_defined",
            TrafficPhase::AwaitingAgents => "awaiting_agents",
            TrafficPhase::TestsTriggered => "tests_triggered",
            TrafficPhase::AwaitingResults => "awaiting_results",
            TrafficPhase::Evaluated => "evaluated",
        })
    }
}

/// Traffic stage executor.
pub struct TrafficCheck<'a> {
    coordinator: &'a CoordinatorClient,
    settings: &'a TrafficSettings,
    cancel: Option<watch::Receiver<bool>>,
    phase: TrafficPhase,
}

impl<'a> TrafficCheck<'a> {
    pub fn new(coordinator: &'a CoordinatorClient, settings: &'a TrafficSettings) -> Self {
        Self {
            coordinator,
            settings,
            cancel: None,
            phase: TrafficPhase::Pending,
        }
    }

    /// Abort barrier waits when the signal flips to `true`.
    pub fn with_cancel(mut self, cancel: Option<watch::Receiver<bool>>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> TrafficPhase {
        self.phase
    }

    pub async fn run(
        &mut self,
        assertions: &[TrafficAssertion],
    ) -> Result<Vec<StageResult>, VerifyError> {
        if assertions.is_empty() {
            self.advance(TrafficPhase::Evaluated);
            return Ok(Vec::new());
        }

        let settings = self.settings;
        let group = &settings.group_label;
        self.coordinator
            .create_object(&CoordinatorObject::group(
                group,
                &settings.agent_hostname_pattern,
            ))
            .await?;
        self.advance(TrafficPhase::GroupsDefined);

        for assertion in assertions {
            self.coordinator
                .create_object(&CoordinatorObject::http_testrun(
                    &assertion.testrun_label(),
                    group,
                    &assertion.target(),
                ))
                .await?;
        }
        self.advance(TrafficPhase::TestsDefined);

        self.advance(TrafficPhase::AwaitingAgents);
        let agents = self.await_agents().await?;
        info!(agents, group = %group, "Agents ready");

        let mut runs = Vec::with_capacity(assertions.len());
        for assertion in assertions {
            let label = assertion.testrun_label();
            let run_id = self.coordinator.run_testrun(&label).await?;
            info!(label = %label, run_id = %run_id, "Test run triggered");
            runs.push((assertion, run_id));
        }
        self.advance(TrafficPhase::TestsTriggered);

        self.advance(TrafficPhase::AwaitingResults);
        let mut reports = Vec::with_capacity(runs.len());
        for (assertion, run_id) in runs {
            let report = self.await_report(&assertion.testrun_label(), &run_id).await?;
            reports.push((assertion, report));
        }

        let results = reports
            .iter()
            .map(|(assertion, report)| evaluate(assertion, report))
            .collect();
        self.advance(TrafficPhase::Evaluated);

        Ok(results)
    }

    /// Block until the agent group is populated; returns the agent count.
    pub async fn await_agents(&self) -> Result<usize, VerifyError> {
        let resource = format!(
            "{} agents in group {}",
            self.settings.min_agents, self.settings.group_label
        );

        Barrier::new(resource, self.settings.agent_poll_interval)
            .with_deadline(self.settings.agent_wait_timeout)
            .with_cancel(self.cancel.clone())
            .wait(|| self.probe_agents())
            .await
    }

    async fn probe_agents(&self) -> Result<Probe<usize>, VerifyError> {
        let count = self
            .coordinator
            .group_members(&self.settings.group_label)
            .await?;

        if count >= self.settings.min_agents {
            Ok(Probe::Ready(count))
        } else {
            Ok(Probe::Pending(format!(
                "{count} of {} agents",
                self.settings.min_agents
            )))
        }
    }

    async fn await_report(&self, label: &str, run_id: &str) -> Result<TestReport, VerifyError> {
        Barrier::new(format!("results of {label}"), self.settings.result_poll_interval)
            .with_deadline(self.settings.result_wait_timeout)
            .with_cancel(self.cancel.clone())
            .wait(|| self.probe_report(run_id))
            .await
    }

    async fn probe_report(&self, run_id: &str) -> Result<Probe<TestReport>, VerifyError> {
        Ok(match self.coordinator.test_data(run_id).await? {
            Some(report) => Probe::Ready(report),
            None => Probe::Pending(format!("no test data for run {run_id}")),
        })
    }

    fn advance(&mut self, next: TrafficPhase) {
        debug!(from = %self.phase, to = %next, "Traffic check phase");
        self.phase = next;
    }
}

/// Evaluate one run's report. Every agent must report the target with an
/// `http_code` of exactly `"200"`; a report without agents fails.
pub fn evaluate(assertion: &TrafficAssertion, report: &TestReport) -> StageResult {
    let subject = Assertion::Traffic(assertion.clone());

    if report.agents.is_empty() {
        return StageResult::fail(subject, "no agent reported results");
    }

    let mut violations = Vec::new();
    for (agent, targets) in &report.agents {
        let Some(targets) = targets.as_ref().filter(|t| !t.is_empty()) else {
            violations.push(format!("{agent} reported no targets"));
            continue;
        };

        for (target, metrics) in targets {
            match &metrics.http_code {
                Some(serde_json::Value::String(code)) if code == EXPECTED_HTTP_CODE => {}
                Some(code) => violations.push(format!("{agent} -> {target} returned http_code {code}")),
                None => violations.push(format!("{agent} -> {target} reported no http_code")),
            }
        }
    }

    if violations.is_empty() {
        StageResult::pass(
            subject,
            format!("{} agents got HTTP 200 from {}", report.agents.len(), assertion.target()),
        )
    } else {
        StageResult::fail(subject, violations.join("; "))
    }
}
