//! Standalone scenario launcher
//!
//! Runs scenarios one after another outside any host test-runner, prints
//! each final report and checks it ended with the expected status.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::backend::ExecutionBackend;
use crate::common::{Error, Result};
use crate::model::{ExecutionReport, ScenarioDefinition, Status};
use crate::report::{console, ReportWriter};

/// Outcome of one launched scenario
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub scenario: String,
    /// Final status, FAILURE when the backend failed
    pub status: Status,
    pub matched: bool,
    pub report: Option<ExecutionReport>,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LaunchSummary {
    pub environment: String,
    pub expected: Status,
    pub outcomes: Vec<LaunchOutcome>,
}

impl LaunchSummary {
    pub fn mismatched(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.matched).count()
    }

    /// Fail unless every scenario ended with the expected status
    pub fn ensure_expected(&self) -> Result<()> {
        match self.mismatched() {
            0 => Ok(()),
            failed => Err(Error::UnexpectedStatus {
                failed,
                total: self.outcomes.len(),
            }),
        }
    }
}

pub struct Launcher {
    backend: Arc<dyn ExecutionBackend>,
    writer: Option<ReportWriter>,
    print: bool,
    colored: bool,
}

impl Launcher {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            writer: None,
            print: true,
            colored: true,
        }
    }

    pub fn with_writer(mut self, writer: ReportWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Do not print reports
    pub fn quiet(mut self) -> Self {
        self.print = false;
        self
    }

    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Run `scenarios` sequentially on `environment` (or the default one)
    pub async fn run(
        &self,
        scenarios: &[ScenarioDefinition],
        environment: Option<&str>,
        expected: Status,
    ) -> Result<LaunchSummary> {
        let name = match environment {
            Some(name) => name.to_string(),
            None => self.backend.default_environment_name().await?,
        };
        let environment = self.backend.resolve_environment(&name).await?;
        tracing::info!(environment = %environment.name, scenarios = scenarios.len(), "Launching scenarios");

        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let outcome = match self.backend.run_and_wait_final(scenario, &environment).await {
                Ok(report) => {
                    let report_path = match &self.writer {
                        Some(writer) => writer.write(&report).await,
                        None => None,
                    };
                    if self.print {
                        print!("{}", console::render(&report, self.colored));
                    }
                    LaunchOutcome {
                        scenario: scenario.title.clone(),
                        status: report.status,
                        matched: report.status == expected,
                        report: Some(report),
                        report_path,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(scenario = %scenario.title, "{}", e);
                    if self.print {
                        println!("{} {} {}", "✗".red(), scenario.title.bold(), e.to_string().red());
                    }
                    LaunchOutcome {
                        scenario: scenario.title.clone(),
                        status: Status::Failure,
                        matched: false,
                        report: None,
                        report_path: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            if self.print && !outcome.matched && outcome.error.is_none() {
                println!(
                    "  {} expected {}, got {}",
                    "!".yellow().bold(),
                    expected,
                    outcome.status
                );
            }
            outcomes.push(outcome);
        }

        Ok(LaunchSummary {
            environment: environment.name,
            expected,
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::model::{Environment, Implementation, Step, StepReport};

    fn scenario(title: &str) -> ScenarioDefinition {
        ScenarioDefinition::new(title, Step::action("do", Implementation::new("debug")))
    }

    #[tokio::test]
    async fn test_launch_checks_expected_status() {
        let backend = ScriptedBackend::new()
            .with_environment(Environment::new("DEV"))
            .script("broken", vec![StepReport::new("broken", Status::Failure)]);
        let launcher = Launcher::new(Arc::new(backend)).quiet();

        let summary = launcher
            .run(&[scenario("fine"), scenario("broken")], None, Status::Success)
            .await
            .unwrap();
        assert_eq!(summary.environment, "DEV");
        assert_eq!(summary.mismatched(), 1);
        assert!(matches!(
            summary.ensure_expected(),
            Err(Error::UnexpectedStatus { failed: 1, total: 2 })
        ));

        let summary = launcher.run(&[scenario("broken")], Some("DEV"), Status::Failure).await.unwrap();
        assert!(summary.ensure_expected().is_ok());
    }

    #[tokio::test]
    async fn test_launch_writes_reports_and_survives_backend_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new()
            .with_environment(Environment::new("DEV"))
            .fail_submit("down", "connection refused");
        let launcher = Launcher::new(Arc::new(backend))
            .with_writer(ReportWriter::new(dir.path()))
            .quiet();

        let summary = launcher
            .run(&[scenario("up"), scenario("down")], Some("DEV"), Status::Success)
            .await
            .unwrap();
        assert!(summary.outcomes[0].report_path.as_ref().unwrap().exists());
        assert!(summary.outcomes[1].error.as_ref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unknown_environment_fails_launch() {
        let launcher = Launcher::new(Arc::new(ScriptedBackend::new())).quiet();
        let result = launcher.run(&[scenario("a")], Some("QA"), Status::Success).await;
        assert!(matches!(result, Err(Error::EnvironmentResolution(_))));
    }
}
