//! Execution of a discovered tree
//!
//! Class-scopes run as independent tasks. Inside a class-scope scenarios
//! pass through a gate of fixed capacity, in discovery order, and a
//! countdown holds the class open until every scenario has finished.
//! Every scenario ends SUCCESS or FAILURE whatever the backend does.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinSet;

use super::context::ClassExecutionContext;
use super::progress::{ScenarioProgress, Transition};
use super::{EngineSettings, ExecutionListener, ExecutionRequest, TestResult};
use crate::backend::ExecutionBackend;
use crate::common::{Error, Result};
use crate::discovery::{ScenarioSource, TestNode, UniqueId};
use crate::model::{Environment, ExecutionReport, Verdict};

/// Collaborators shared by every task of one run
struct Run {
    listener: Arc<dyn ExecutionListener>,
    backend: Arc<dyn ExecutionBackend>,
    settings: Arc<EngineSettings>,
}

/// Run the whole tree and emit the engine-level events
pub async fn execute(request: ExecutionRequest, backend: Arc<dyn ExecutionBackend>, settings: Arc<EngineSettings>) {
    let ExecutionRequest { root, listener, skip } = request;
    let run = Arc::new(Run {
        listener,
        backend,
        settings,
    });
    let skip = Arc::new(skip);

    run.listener.execution_started(&root);

    let mut classes = JoinSet::new();
    for class in &root.children {
        if skip.contains(&class.id) {
            run.listener.execution_skipped(class, "excluded from execution");
            continue;
        }
        let class = Arc::new(class.clone());
        let run = Arc::clone(&run);
        let skip = Arc::clone(&skip);
        classes.spawn(async move { execute_class(class, run, &skip).await });
    }

    let mut verdict = Verdict::Success;
    while let Some(joined) = classes.join_next().await {
        match joined {
            Ok(class_verdict) => verdict = verdict.max(class_verdict),
            Err(e) => {
                tracing::error!("Class execution task failed: {}", e);
                verdict = Verdict::Failure;
            }
        }
    }

    tracing::info!(verdict = %verdict, "Execution finished");
    run.listener.execution_finished(&root, &TestResult::from_verdict(verdict));
}

/// Run one class-scope; returns its worst verdict
async fn execute_class(class: Arc<TestNode>, run: Arc<Run>, skip: &HashSet<UniqueId>) -> Verdict {
    run.listener.execution_started(&class);

    let mut runnable = Vec::new();
    for scenario in class.children.iter().filter(|c| c.is_scenario()) {
        if skip.contains(&scenario.id) {
            run.listener.execution_skipped(scenario, "excluded from execution");
        } else {
            runnable.push(Arc::new(scenario.clone()));
        }
    }

    let ctx = Arc::new(ClassExecutionContext::new(
        Arc::clone(&class),
        run.settings.concurrency,
        runnable.len(),
    ));
    tracing::debug!(class = %class.id, scenarios = runnable.len(), capacity = ctx.capacity(), "Entering class");

    // Environments are resolved before any scenario holds the gate, so a
    // failed resolution never overlaps a running sibling.
    let mut prepared = Vec::with_capacity(runnable.len());
    for scenario in runnable {
        match resolve_environment(run.backend.as_ref(), &scenario).await {
            Ok(environment) => prepared.push((scenario, environment)),
            Err(e) => {
                let guard = ctx.countdown_guard();
                tracing::warn!(scenario = %scenario.id, "{}", e);
                run.listener.execution_started(&scenario);
                ctx.record(Verdict::Failure);
                run.listener.execution_finished(&scenario, &TestResult::failure(e.to_string()));
                drop(guard);
            }
        }
    }

    for (scenario, environment) in prepared {
        let guard = ctx.countdown_guard();
        let permit = match ctx.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                run.listener.execution_started(&scenario);
                ctx.record(Verdict::Failure);
                run.listener.execution_finished(&scenario, &TestResult::failure(e.to_string()));
                continue;
            }
        };

        run.listener.execution_started(&scenario);
        let in_flight = ctx.enter(&scenario.id);
        tracing::debug!(scenario = %scenario.id, in_flight, "Scenario started");

        let run = Arc::clone(&run);
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let task = tokio::spawn(execute_scenario(
                Arc::clone(&scenario),
                environment,
                Arc::clone(&run),
                Arc::clone(&ctx),
            ));
            if let Err(e) = task.await {
                tracing::error!(scenario = %scenario.id, "Scenario task failed: {}", e);
                // Still in flight means the finished event never went out
                if ctx.leave(&scenario.id, Verdict::Failure) {
                    run.listener
                        .execution_finished(&scenario, &TestResult::failure(format!("scenario task failed: {}", e)));
                }
            }
            drop(permit);
            drop(guard);
        });
    }

    ctx.wait_all().await;
    let verdict = ctx.verdict();
    tracing::debug!(class = %class.id, verdict = %verdict, "Class finished");
    run.listener.execution_finished(&class, &TestResult::from_verdict(verdict));
    verdict
}

/// Explicit environment of the scenario, else the backend default
async fn resolve_environment(backend: &dyn ExecutionBackend, scenario: &TestNode) -> Result<Environment> {
    let source = scenario
        .scenario()
        .ok_or_else(|| Error::Internal(format!("{} is not a scenario node", scenario.id)))?;
    let name = match &source.environment {
        Some(name) => name.clone(),
        None => backend.default_environment_name().await?,
    };
    backend.resolve_environment(&name).await
}

/// Submit, follow the stream and publish the verdict
///
/// The caller holds the gate permit and the countdown guard, so a
/// panicking task still gets a finished event before either is released.
#[tracing::instrument(skip_all, fields(scenario = %scenario.display_name, environment = %environment.name))]
async fn execute_scenario(
    scenario: Arc<TestNode>,
    environment: Environment,
    run: Arc<Run>,
    ctx: Arc<ClassExecutionContext>,
) {
    let mut progress = ScenarioProgress::new(Arc::clone(&scenario));

    let outcome = match scenario.scenario() {
        Some(source) => follow(source, &environment, &run, &mut progress).await,
        None => Err(Error::Internal(format!("{} is not a scenario node", scenario.id))),
    };

    let (result, failure) = match outcome {
        Ok(report) => {
            if let Some(writer) = &run.settings.writer {
                writer.write(&report).await;
            }
            run.listener.report_published(&scenario, &report);
            let result = TestResult {
                verdict: report.verdict(),
                diagnostic: report.failure_summary(),
            };
            (result, None)
        }
        Err(e) => {
            tracing::warn!("{}", e);
            let message = e.to_string();
            (TestResult::failure(message.clone()), Some(message))
        }
    };

    let closing = progress.finish(failure.as_deref());
    emit(&run, &progress, closing);

    tracing::info!(verdict = %result.verdict, snapshots = progress.snapshots(), "Scenario finished");
    ctx.leave(&scenario.id, result.verdict);
    run.listener.execution_finished(&scenario, &result);
}

/// Submit the scenario and consume its notifications to the end
async fn follow(
    source: &ScenarioSource,
    environment: &Environment,
    run: &Run,
    progress: &mut ScenarioProgress,
) -> Result<ExecutionReport> {
    let definition = &source.definition;
    let execution_id = run
        .backend
        .submit(
            definition,
            environment,
            &run.settings.constants,
            definition.default_dataset.as_deref(),
        )
        .await?;
    tracing::debug!(execution_id, "Submitted");

    let mut stream = run.backend.notifications(execution_id).await?;
    while let Some(snapshot) = stream.next().await {
        let snapshot = snapshot?;
        let transitions = progress.observe(&snapshot);
        emit(run, progress, transitions);
    }

    progress
        .last()
        .cloned()
        .ok_or_else(|| Error::stream(format!("execution {} ended without any report", execution_id)))
}

fn emit(run: &Run, progress: &ScenarioProgress, transitions: Vec<Transition>) {
    for transition in transitions {
        match transition {
            Transition::Started(i) => {
                if let Some(node) = progress.node(i) {
                    run.listener.execution_started(node);
                }
            }
            Transition::Finished(i, result) => {
                if let Some(node) = progress.node(i) {
                    run.listener.execution_finished(node, &result);
                }
            }
            Transition::Skipped(i, reason) => {
                if let Some(node) = progress.node(i) {
                    run.listener.execution_skipped(node, &reason);
                }
            }
        }
    }
}
