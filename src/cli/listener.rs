//! Console output for `chutney run`

use std::sync::atomic::{AtomicUsize, Ordering};

use colored::Colorize;

use crate::discovery::{NodeSource, TestNode};
use crate::engine::{ExecutionListener, TestResult};
use crate::model::{ExecutionReport, Verdict};

/// Prints lifecycle events and counts scenario verdicts
#[derive(Debug, Default)]
pub struct ConsoleListener {
    total: AtomicUsize,
    failed: AtomicUsize,
    verbose: bool,
}

impl ConsoleListener {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// (failed, total) scenarios so far
    pub fn summary(&self) -> (usize, usize) {
        (
            self.failed.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
        )
    }
}

fn indent(node: &TestNode) -> String {
    "  ".repeat(node.id.segments().count().saturating_sub(2))
}

impl ExecutionListener for ConsoleListener {
    fn execution_started(&self, node: &TestNode) {
        if let NodeSource::Class { name } = &node.source {
            println!("{} {}", "▶".blue().bold(), name.white().bold());
        }
    }

    fn execution_finished(&self, node: &TestNode, result: &TestResult) {
        let glyph = match result.verdict {
            Verdict::Success => "✓".green(),
            Verdict::Failure => "✗".red(),
        };

        match &node.source {
            NodeSource::Engine | NodeSource::Class { .. } => {}
            NodeSource::Scenario(source) => {
                self.total.fetch_add(1, Ordering::SeqCst);
                if result.verdict == Verdict::Failure {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                }
                let environment = source.environment.as_deref().unwrap_or("default");
                println!(
                    "{}{} {} {}",
                    indent(node),
                    glyph,
                    node.display_name,
                    format!("[{}]", environment).dimmed()
                );
                if let Some(diagnostic) = &result.diagnostic {
                    for line in diagnostic.lines() {
                        println!("{}    {}", indent(node), line.red());
                    }
                }
            }
            NodeSource::Step { .. } => {
                if self.verbose || result.verdict == Verdict::Failure {
                    println!("{}{} {}", indent(node), glyph, node.display_name.dimmed());
                }
            }
        }
    }

    fn execution_skipped(&self, node: &TestNode, reason: &str) {
        if self.verbose || node.is_scenario() {
            println!(
                "{}{} {} {}",
                indent(node),
                "○".dimmed(),
                node.display_name,
                format!("({})", reason).dimmed()
            );
        }
    }

    fn report_published(&self, node: &TestNode, report: &ExecutionReport) {
        tracing::debug!(
            scenario = %node.id,
            execution_id = report.execution_id,
            status = %report.status,
            duration_ms = report.duration_ms,
            "Report published"
        );
    }
}
