//! Snapshot handling for one running scenario
//!
//! Every notification is a full snapshot. For each step node the tracker
//! holds the last report it acted on and applies two policies:
//!
//! * [`should_emit`]: a changed status, or a retry-governed node failing
//!   again, replaces the held report and may move the node's lifecycle
//! * [`merge`]: anything else only refreshes volatile fields
//!
//! Nodes inside a retry-with-timeout scope fail and recover repeatedly
//! while the backend retries, so they (and their ancestors) finish only
//! when the stream ends.

use std::sync::Arc;

use crate::discovery::TestNode;
use crate::model::{ExecutionReport, Status, StepReport, Verdict};

use super::TestResult;

/// Whether `new` replaces `old` and fires lifecycle transitions
pub fn should_emit(old: &StepReport, new: &StepReport, retryable: bool) -> bool {
    old.status != new.status || (retryable && new.status == Status::Failure)
}

/// `old` with the volatile fields of `new`
pub fn merge(old: &StepReport, new: &StepReport) -> StepReport {
    StepReport {
        duration_ms: new.duration_ms,
        start_date: new.start_date,
        information: new.information.clone(),
        evaluated_inputs: new.evaluated_inputs.clone(),
        step_outputs: new.step_outputs.clone(),
        ..old.clone()
    }
}

/// Lifecycle move of a step node, by tracker index
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started(usize),
    Finished(usize, TestResult),
    Skipped(usize, String),
}

#[derive(Debug)]
struct Tracked {
    /// Child positions from the scenario node, equal to report positions
    path: Vec<usize>,
    parent: Option<usize>,
    /// Descendant entries occupy `index + 1 .. end`
    end: usize,
    retryable: bool,
    deferred: bool,
    held: StepReport,
    started: bool,
    finished: bool,
}

/// Per-scenario progress over its step nodes, in pre-order
#[derive(Debug)]
pub struct ScenarioProgress {
    scenario: Arc<TestNode>,
    nodes: Vec<Tracked>,
    root: StepReport,
    last: Option<ExecutionReport>,
    snapshots: usize,
}

impl ScenarioProgress {
    pub fn new(scenario: Arc<TestNode>) -> Self {
        let mut nodes = Vec::new();
        for (rank, child) in scenario.children.iter().enumerate() {
            index(child, vec![rank], None, false, &mut nodes);
        }
        Self {
            scenario,
            nodes,
            root: StepReport::default(),
            last: None,
            snapshots: 0,
        }
    }

    /// Step node of a transition
    pub fn node(&self, index: usize) -> Option<&TestNode> {
        let mut node = self.scenario.as_ref();
        for position in &self.nodes.get(index)?.path {
            node = node.children.get(*position)?;
        }
        Some(node)
    }

    /// Last snapshot received
    pub fn last(&self) -> Option<&ExecutionReport> {
        self.last.as_ref()
    }

    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    /// Apply one snapshot and return the transitions it causes
    pub fn observe(&mut self, snapshot: &ExecutionReport) -> Vec<Transition> {
        self.snapshots += 1;
        if should_emit(&self.root, &snapshot.report, false) {
            tracing::debug!(
                scenario = %snapshot.scenario_name,
                from = %self.root.status,
                to = %snapshot.report.status,
                "Scenario status changed"
            );
            self.root = snapshot.report.clone();
        } else {
            self.root = merge(&self.root, &snapshot.report);
        }
        self.last = Some(snapshot.clone());

        let mut transitions = Vec::new();
        let mut emitted = vec![false; self.nodes.len()];
        let mut open: Vec<usize> = Vec::new();

        for i in 0..self.nodes.len() {
            self.complete(&mut open, i, &emitted, &mut transitions);
            open.push(i);

            let Some(new) = report_at(&snapshot.report, &self.nodes[i].path) else {
                continue;
            };
            let node = &mut self.nodes[i];
            if should_emit(&node.held, new, node.retryable) {
                node.held = without_steps(new);
                emitted[i] = true;
                if new.status != Status::NotExecuted && !node.started {
                    self.start(i, &mut transitions);
                }
            } else {
                node.held = merge(&node.held, new);
            }
        }
        self.complete(&mut open, self.nodes.len(), &emitted, &mut transitions);
        transitions
    }

    /// Finish the open nodes whose subtree ends before `next`
    fn complete(&mut self, open: &mut Vec<usize>, next: usize, emitted: &[bool], transitions: &mut Vec<Transition>) {
        while let Some(&i) = open.last() {
            if self.nodes[i].end > next {
                break;
            }
            open.pop();

            let node = &self.nodes[i];
            if !(emitted[i] && node.held.status.is_terminal() && node.started && !node.finished && !node.deferred) {
                continue;
            }
            let subtree = self
                .last
                .as_ref()
                .and_then(|last| report_at(&last.report, &node.path));
            let result = step_result(&node.held, subtree);
            self.finish_descendants(i, None, transitions);
            self.nodes[i].finished = true;
            transitions.push(Transition::Finished(i, result));
        }
    }

    /// Close every node still open once the stream ended
    ///
    /// `failure` is the stream or submission error, if any; open nodes
    /// then fail with it.
    pub fn finish(&mut self, failure: Option<&str>) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for i in (0..self.nodes.len()).rev() {
            self.close(i, failure, &mut transitions);
        }
        transitions
    }

    fn start(&mut self, i: usize, transitions: &mut Vec<Transition>) {
        if let Some(parent) = self.nodes[i].parent {
            if !self.nodes[parent].started {
                self.start(parent, transitions);
            }
        }
        self.nodes[i].started = true;
        transitions.push(Transition::Started(i));
    }

    fn finish_descendants(&mut self, i: usize, failure: Option<&str>, transitions: &mut Vec<Transition>) {
        for d in (i + 1..self.nodes[i].end).rev() {
            self.close(d, failure, transitions);
        }
    }

    /// Finish a started node, or skip an unstarted one under a started parent
    fn close(&mut self, i: usize, failure: Option<&str>, transitions: &mut Vec<Transition>) {
        let node = &self.nodes[i];
        if node.finished {
            return;
        }
        if !node.started {
            let parent_started = node.parent.map_or(true, |p| self.nodes[p].started);
            self.nodes[i].finished = true;
            if parent_started {
                transitions.push(Transition::Skipped(i, "not executed".to_string()));
            }
            return;
        }

        let result = match failure {
            Some(error) => TestResult::failure(error),
            None => {
                let subtree = self
                    .last
                    .as_ref()
                    .and_then(|last| report_at(&last.report, &node.path));
                step_result(&node.held, subtree)
            }
        };
        self.nodes[i].finished = true;
        transitions.push(Transition::Finished(i, result));
    }
}

fn index(node: &TestNode, path: Vec<usize>, parent: Option<usize>, in_retry: bool, out: &mut Vec<Tracked>) -> bool {
    let me = out.len();
    let retry_scope = in_retry || node.retryable;
    out.push(Tracked {
        path: path.clone(),
        parent,
        end: me + 1,
        retryable: retry_scope,
        deferred: retry_scope,
        held: StepReport::default(),
        started: false,
        finished: false,
    });

    let mut retry_below = false;
    for (rank, child) in node.children.iter().enumerate() {
        let mut child_path = path.clone();
        child_path.push(rank);
        retry_below |= index(child, child_path, Some(me), retry_scope, out);
    }

    out[me].end = out.len();
    out[me].deferred |= retry_below;
    retry_scope || retry_below
}

fn report_at<'a>(root: &'a StepReport, path: &[usize]) -> Option<&'a StepReport> {
    let mut report = root;
    for position in path {
        report = report.steps.get(*position)?;
    }
    Some(report)
}

fn without_steps(report: &StepReport) -> StepReport {
    StepReport {
        steps: Vec::new(),
        ..report.clone()
    }
}

fn step_result(held: &StepReport, subtree: Option<&StepReport>) -> TestResult {
    let worst = subtree
        .and_then(StepReport::worst_terminal)
        .into_iter()
        .chain(Verdict::from_status(held.status))
        .max();

    match worst {
        Some(Verdict::Success) if held.status == Status::Success => TestResult::success(),
        Some(Verdict::Failure) => {
            let messages = subtree.map(StepReport::failure_messages).unwrap_or_default();
            if messages.is_empty() {
                TestResult::failure(format!("step '{}' failed", held.name))
            } else {
                TestResult::failure(messages.join("\n"))
            }
        }
        _ => TestResult::failure(format!("step '{}' ended with status {}", held.name, held.status)),
    }
}
