//! Config stage: every exposed service has an application object whose
//! destination port matches the service's external port.

use std::collections::BTreeMap;
use std::fmt;

use netverify_assertions::{Assertion, ConfigAssertion, StageResult};
use tracing::{debug, info, warn};

use crate::engine::{CheckOutcome, ConfigAssertionEngine, ConfigTestDefinition};
use crate::error::VerifyError;

/// Progress of a config check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPhase {
    Pending,
    TestsGenerated,
    Submitted,
    Evaluated,
}

impl fmt::Display for ConfigPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigPhase::Pending => "pending",
            ConfigPhase::TestsGenerated => "tests_generated",
            ConfigPhase::Submitted => "submitted",
            ConfigPhase::Evaluated => "evaluated",
        })
    }
}

/// Config stage executor.
pub struct ConfigCheck<'a> {
    engine: &'a dyn ConfigAssertionEngine,
    phase: ConfigPhase,
}

impl<'a> ConfigCheck<'a> {
    pub fn new(engine: &'a dyn ConfigAssertionEngine) -> Self {
        Self {
            engine,
            phase: ConfigPhase::Pending,
        }
    }

    pub fn phase(&self) -> ConfigPhase {
        self.phase
    }

    /// Submit one test per assertion in a single snapcheck and map the
    /// outcomes back by test name.
    pub async fn run(
        &mut self,
        assertions: &[ConfigAssertion],
    ) -> Result<Vec<StageResult>, VerifyError> {
        let tests: Vec<ConfigTestDefinition> = assertions
            .iter()
            .map(ConfigTestDefinition::for_assertion)
            .collect();
        self.advance(ConfigPhase::TestsGenerated);

        if tests.is_empty() {
            self.advance(ConfigPhase::Evaluated);
            return Ok(Vec::new());
        }

        let outcomes = self.engine.snapcheck(&tests).await?;
        self.advance(ConfigPhase::Submitted);

        let results = evaluate(assertions, outcomes);
        self.advance(ConfigPhase::Evaluated);

        info!(
            tests = results.len(),
            failed = results.iter().filter(|r| !r.passed).count(),
            "Config check evaluated"
        );
        Ok(results)
    }

    fn advance(&mut self, next: ConfigPhase) {
        debug!(from = %self.phase, to = %next, "Config check phase");
        self.phase = next;
    }
}

/// Match outcomes to assertions. An assertion passes only if at least one
/// outcome carries its test name and every such outcome passed.
pub fn evaluate(assertions: &[ConfigAssertion], outcomes: Vec<CheckOutcome>) -> Vec<StageResult> {
    let mut by_name: BTreeMap<String, Vec<CheckOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_name.entry(outcome.test_name.clone()).or_default().push(outcome);
    }

    let results = assertions
        .iter()
        .map(|assertion| {
            let subject = Assertion::Config(assertion.clone());
            match by_name.remove(&assertion.test_name()) {
                None => StageResult::fail(subject, "no result reported"),
                Some(found) => match found.iter().find(|o| !o.passed()) {
                    None => StageResult::pass(
                        subject,
                        format!("destination-port is {}", assertion.expected_port),
                    ),
                    Some(failed) => StageResult::fail(
                        subject,
                        failed.message.clone().unwrap_or_else(|| {
                            format!(
                                "{} reported {}, expected destination-port {}",
                                failed.test_name, failed.result, assertion.expected_port
                            )
                        }),
                    ),
                },
            }
        })
        .collect();

    for unexpected in by_name.keys() {
        warn!(test = %unexpected, "Engine reported a test that was not submitted");
    }

    results
}
