//! Execution reports and verdicts
//!
//! The execution backend produces [`ExecutionReport`] snapshots whose
//! [`StepReport`] tree mirrors the scenario's step tree. A snapshot always
//! replaces the previous one; nothing here is mutated in place by the
//! orchestrator except through [`crate::engine::progress::merge`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier handed out by the backend on submission
pub type ExecutionId = u64;

/// Status of a scenario or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
    Running,
    Paused,
    #[default]
    NotExecuted,
    Stopped,
}

impl Status {
    /// SUCCESS and FAILURE are the only statuses reduced into a verdict
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure)
    }

    /// Whether a stream may still deliver snapshots after this status
    pub fn is_in_progress(self) -> bool {
        matches!(self, Status::Running | Status::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::NotExecuted => "NOT_EXECUTED",
            Status::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUCCESS" => Ok(Status::Success),
            "FAILURE" => Ok(Status::Failure),
            "RUNNING" => Ok(Status::Running),
            "PAUSED" => Ok(Status::Paused),
            "NOT_EXECUTED" => Ok(Status::NotExecuted),
            "STOPPED" => Ok(Status::Stopped),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Report of one step, recursively mirroring the step tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StepReport {
    pub name: String,
    pub status: Status,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDateTime>,
    pub errors: Vec<String>,
    pub information: Vec<String>,
    pub evaluated_inputs: BTreeMap<String, Value>,
    pub step_outputs: BTreeMap<String, Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub steps: Vec<StepReport>,
}

impl StepReport {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepReport>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Worst terminal status in this subtree, ignoring non-terminal nodes
    pub fn worst_terminal(&self) -> Option<Verdict> {
        let own = Verdict::from_status(self.status);
        self.steps
            .iter()
            .filter_map(StepReport::worst_terminal)
            .chain(own)
            .max()
    }

    /// `name: error` lines for every failing node of the subtree
    pub fn failure_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        self.collect_failures(&mut messages);
        messages
    }

    fn collect_failures(&self, out: &mut Vec<String>) {
        if self.status == Status::Failure {
            for error in &self.errors {
                out.push(format!("{}: {}", self.name, error));
            }
        }
        for step in &self.steps {
            step.collect_failures(out);
        }
    }
}

/// A full snapshot of one scenario execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub scenario_name: String,
    pub environment: String,
    pub status: Status,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDateTime>,
    pub report: StepReport,
    pub constants: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl ExecutionReport {
    /// Build a snapshot around a root step report, taking its status
    pub fn new(
        execution_id: ExecutionId,
        scenario_name: impl Into<String>,
        environment: impl Into<String>,
        report: StepReport,
    ) -> Self {
        Self {
            execution_id,
            scenario_name: scenario_name.into(),
            environment: environment.into(),
            status: report.status,
            duration_ms: report.duration_ms,
            start_date: report.start_date,
            report,
            ..Default::default()
        }
    }

    /// Reduce this snapshot to a pass/fail outcome
    ///
    /// Any FAILURE anywhere yields FAILURE. Otherwise the scenario passes
    /// only if it ended SUCCESS; a scenario that ended STOPPED, or still
    /// non-terminal, fails.
    pub fn verdict(&self) -> Verdict {
        let worst = self
            .report
            .worst_terminal()
            .into_iter()
            .chain(Verdict::from_status(self.status))
            .max();

        match worst {
            Some(Verdict::Failure) => Verdict::Failure,
            _ if self.status == Status::Success => Verdict::Success,
            _ => Verdict::Failure,
        }
    }

    /// Human-readable explanation of a failing verdict
    pub fn failure_summary(&self) -> Option<String> {
        if self.verdict() == Verdict::Success {
            return None;
        }
        let mut lines = self.report.failure_messages();
        if !self.status.is_terminal() {
            lines.push(format!("scenario ended with status {}", self.status));
        }
        if lines.is_empty() {
            lines.push(format!("scenario '{}' failed", self.scenario_name));
        }
        Some(lines.join("\n"))
    }
}

/// Terminal pass/fail outcome, ordered SUCCESS < FAILURE
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Success,
    Failure,
}

impl Verdict {
    /// Map terminal statuses; non-terminal ones do not reduce
    pub fn from_status(status: Status) -> Option<Self> {
        match status {
            Status::Success => Some(Verdict::Success),
            Status::Failure => Some(Verdict::Failure),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Verdict::Success
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => f.write_str("SUCCESS"),
            Verdict::Failure => f.write_str("FAILURE"),
        }
    }
}
