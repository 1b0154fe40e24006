//! Report materialization to disk
//!
//! Final reports land at
//! `<root>/<environment>/<scenario-name><yyyyMMddHHmmssSSS>.json`. Writing
//! is a side effect only: a failed write is logged and never changes a
//! verdict.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::common::paths::{sanitize_file_name, sanitize_path_component};
use crate::common::{Error, Result};
use crate::model::ExecutionReport;

/// Fixed-width local timestamp appended to report file names
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
}

impl ReportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a report written at `at` goes
    pub fn path_for(&self, report: &ExecutionReport, at: DateTime<Local>) -> PathBuf {
        let environment = sanitize_path_component(&report.environment);
        let name = sanitize_file_name(&report.scenario_name);
        self.root
            .join(environment)
            .join(format!("{}{}.json", name, at.format(TIMESTAMP_FORMAT)))
    }

    /// Write the report, overwriting a same-named file
    pub async fn try_write(&self, report: &ExecutionReport) -> Result<PathBuf> {
        let path = self.path_for(report, Local::now());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::materialization(parent, e))?;
        }
        let json = serde_json::to_string_pretty(report).map_err(|e| Error::materialization(&path, e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| Error::materialization(&path, e))?;
        tracing::debug!(path = %path.display(), "Report written");
        Ok(path)
    }

    /// Write the report, logging instead of failing
    pub async fn write(&self, report: &ExecutionReport) -> Option<PathBuf> {
        match self.try_write(report).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(scenario = %report.scenario_name, "{}", e);
                None
            }
        }
    }
}
