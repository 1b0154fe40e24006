//! Console rendering of execution reports
//!
//! ```text
//! ✓ Search documents [DEV] SUCCESS in 1204 ms
//!   ✓ open the site 120 ms
//!   ✗ search 1080 ms
//!       error: element #q not found
//! ```

use colored::Colorize;
use std::fmt::Write;

use crate::model::{ExecutionReport, Status, StepReport};

/// Glyph for a status
pub fn glyph(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Failure => "✗",
        Status::Running => "▶",
        Status::Paused => "‖",
        Status::NotExecuted => "○",
        Status::Stopped => "■",
    }
}

fn paint(text: &str, status: Status, colored: bool) -> String {
    if !colored {
        return text.to_string();
    }
    match status {
        Status::Success => text.green().to_string(),
        Status::Failure => text.red().to_string(),
        Status::Running | Status::Paused => text.yellow().to_string(),
        Status::NotExecuted | Status::Stopped => text.dimmed().to_string(),
    }
}

/// Render a report as an indented tree
pub fn render(report: &ExecutionReport, colored: bool) -> String {
    let mut out = String::new();
    let title = if colored {
        report.scenario_name.bold().to_string()
    } else {
        report.scenario_name.clone()
    };
    let _ = writeln!(
        out,
        "{} {} [{}] {} in {} ms",
        paint(glyph(report.status), report.status, colored),
        title,
        report.environment,
        paint(report.status.as_str(), report.status, colored),
        report.duration_ms
    );
    for step in &report.report.steps {
        render_step(&mut out, step, 1, colored);
    }
    out
}

fn render_step(out: &mut String, step: &StepReport, depth: usize, colored: bool) {
    let indent = "  ".repeat(depth);
    let name = match &step.target_name {
        Some(target) => format!("{} ({})", step.name, target),
        None => step.name.clone(),
    };
    let _ = writeln!(
        out,
        "{}{} {} {} ms",
        indent,
        paint(glyph(step.status), step.status, colored),
        name,
        step.duration_ms
    );

    let detail = "  ".repeat(depth + 2);
    for info in &step.information {
        let line = format!("info: {}", info);
        let _ = writeln!(out, "{}{}", detail, if colored { line.dimmed().to_string() } else { line });
    }
    for error in &step.errors {
        let _ = writeln!(out, "{}{}", detail, paint(&format!("error: {}", error), Status::Failure, colored));
    }
    for sub in &step.steps {
        render_step(out, sub, depth + 1, colored);
    }
}
