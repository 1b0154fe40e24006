//! In-memory backend replaying scripted report snapshots
//!
//! Scripts are keyed by scenario title. A scenario without a script runs
//! through a RUNNING snapshot and ends with every step SUCCESS, which is
//! what `chutney run --dry-run` relies on. Every submission and every
//! opened stream is recorded for inspection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use super::{ExecutionBackend, ReportStream};
use crate::common::{EnvironmentError, Error, Result};
use crate::model::{
    Environment, ExecutionId, ExecutionReport, ScenarioDefinition, Status, Step, StepReport,
};

/// One element of a scripted stream
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Snapshot whose scenario status is the root step status
    Report(StepReport),
    /// Broken stream
    Error(String),
}

#[derive(Debug, Clone, Default)]
struct Script {
    submit_error: Option<String>,
    items: Vec<Scripted>,
}

/// A recorded `submit` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub execution_id: ExecutionId,
    pub scenario: String,
    pub environment: String,
    pub dataset: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_id: ExecutionId,
    pending: HashMap<ExecutionId, (String, String, Vec<Scripted>)>,
    submissions: Vec<Submission>,
    streams_opened: Vec<ExecutionId>,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    environments: Vec<Environment>,
    scripts: HashMap<String, Script>,
    step_delay: Duration,
    state: Mutex<State>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn with_environments(mut self, environments: impl IntoIterator<Item = Environment>) -> Self {
        self.environments.extend(environments);
        self
    }

    /// Replay these snapshots for the scenario titled `title`
    pub fn script(self, title: impl Into<String>, snapshots: Vec<StepReport>) -> Self {
        self.script_items(title, snapshots.into_iter().map(Scripted::Report).collect())
    }

    pub fn script_items(mut self, title: impl Into<String>, items: Vec<Scripted>) -> Self {
        self.scripts.entry(title.into()).or_default().items = items;
        self
    }

    /// Reject submissions of the scenario titled `title`
    pub fn fail_submit(mut self, title: impl Into<String>, reason: impl Into<String>) -> Self {
        self.scripts.entry(title.into()).or_default().submit_error = Some(reason.into());
        self
    }

    /// Pause before delivering each snapshot
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn streams_opened(&self) -> Vec<ExecutionId> {
        self.state().streams_opened.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A report tree shaped like `scenario` with every node at `status`
    pub fn mirror(scenario: &ScenarioDefinition, status: Status) -> StepReport {
        fn mirror_step(step: &Step, status: Status) -> StepReport {
            let mut report = StepReport::new(&step.description, status)
                .with_steps(step.sub_steps.iter().map(|s| mirror_step(s, status)).collect());
            if let Some(implementation) = &step.implementation {
                report.step_type = Some(implementation.action.clone());
                report.target_name = implementation.target.clone();
            }
            report.strategy = step.strategy.as_ref().map(|s| s.kind.clone());
            report
        }

        StepReport::new(&scenario.title, status)
            .with_steps(scenario.steps().map(|s| mirror_step(s, status)).collect())
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn submit(
        &self,
        scenario: &ScenarioDefinition,
        environment: &Environment,
        _constants: &BTreeMap<String, String>,
        dataset: Option<&str>,
    ) -> Result<ExecutionId> {
        let script = self.scripts.get(&scenario.title).cloned().unwrap_or_default();
        if let Some(reason) = script.submit_error {
            return Err(Error::submission(reason));
        }

        let items = if script.items.is_empty() && !self.scripts.contains_key(&scenario.title) {
            vec![
                Scripted::Report(Self::mirror(scenario, Status::Running)),
                Scripted::Report(Self::mirror(scenario, Status::Success)),
            ]
        } else {
            script.items
        };

        let mut state = self.state();
        state.next_id += 1;
        let execution_id = state.next_id;
        state.submissions.push(Submission {
            execution_id,
            scenario: scenario.title.clone(),
            environment: environment.name.clone(),
            dataset: dataset.map(str::to_string),
        });
        state.pending.insert(
            execution_id,
            (scenario.title.clone(), environment.name.clone(), items),
        );
        Ok(execution_id)
    }

    async fn notifications(&self, execution_id: ExecutionId) -> Result<ReportStream> {
        let (title, environment, items) = {
            let mut state = self.state();
            state.streams_opened.push(execution_id);
            state.pending.remove(&execution_id).ok_or_else(|| {
                Error::stream(format!("unknown execution {}", execution_id))
            })?
        };

        let snapshots: Vec<Result<ExecutionReport>> = items
            .into_iter()
            .map(|item| match item {
                Scripted::Report(report) => Ok(ExecutionReport::new(
                    execution_id,
                    title.clone(),
                    environment.clone(),
                    report,
                )),
                Scripted::Error(reason) => Err(Error::stream(reason)),
            })
            .collect();

        let delay = self.step_delay;
        Ok(stream::iter(snapshots)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }

    async fn default_environment_name(&self) -> Result<String> {
        match self.environments.as_slice() {
            [] => Err(EnvironmentError::NoneDefined.into()),
            [only] => Ok(only.name.clone()),
            several => Err(EnvironmentError::Ambiguous {
                candidates: several.iter().map(|e| e.name.clone()).collect(),
            }
            .into()),
        }
    }

    async fn resolve_environment(&self, name: &str) -> Result<Environment> {
        self.environments
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| {
                EnvironmentError::NotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Implementation, Verdict};

    fn scenario() -> ScenarioDefinition {
        ScenarioDefinition::new("Search", Step::action("search", Implementation::new("http-get")))
    }

    #[tokio::test]
    async fn test_unscripted_scenario_succeeds() {
        let backend = ScriptedBackend::new().with_environment(Environment::new("DEV"));
        let env = backend.resolve_environment("DEV").await.unwrap();
        let report = backend.run_and_wait_final(&scenario(), &env).await.unwrap();

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.verdict(), Verdict::Success);
        assert_eq!(report.report.steps[0].step_type.as_deref(), Some("http-get"));
        assert_eq!(backend.submissions()[0].environment, "DEV");
    }

    #[tokio::test]
    async fn test_scripted_stream_and_errors() {
        let backend = ScriptedBackend::new()
            .script_items(
                "Search",
                vec![
                    Scripted::Report(StepReport::new("Search", Status::Running)),
                    Scripted::Error("connection reset".to_string()),
                ],
            )
            .fail_submit("Other", "backend down");

        let env = Environment::new("DEV");
        let result = backend.run_and_wait_final(&scenario(), &env).await;
        assert!(matches!(result, Err(Error::Stream(ref m)) if m == "connection reset"));

        let other = ScenarioDefinition::new("Other", Step::group("when", vec![]));
        let result = backend.run_and_wait_final(&other, &env).await;
        assert!(matches!(result, Err(Error::Submission(_))));
        assert_eq!(backend.streams_opened().len(), 1);
    }

    #[tokio::test]
    async fn test_default_environment_rules() {
        let none = ScriptedBackend::new();
        assert!(none.default_environment_name().await.is_err());

        let two = ScriptedBackend::new()
            .with_environment(Environment::new("DEV"))
            .with_environment(Environment::new("PROD"));
        match two.default_environment_name().await {
            Err(Error::EnvironmentResolution(EnvironmentError::Ambiguous { candidates })) => {
                assert_eq!(candidates.len(), 2)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
