//! Error types for the scenario engine
//!
//! Errors that reach a scenario node are rendered into the node's verdict
//! diagnostic, so messages name the scenario, environment or execution
//! they concern.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario engine
#[derive(Error, Debug)]
pub enum Error {
    // === Discovery Errors ===
    #[error("Discovery failed: {0}")]
    Discovery(DiscoveryIssue),

    #[error("Failed to parse scenario file '{path}': {error}")]
    ScenarioParse { path: String, error: String },

    // === Environment Errors ===
    #[error("Environment resolution failed: {0}")]
    EnvironmentResolution(#[from] EnvironmentError),

    // === Backend Errors ===
    #[error("Scenario submission failed: {0}")]
    Submission(String),

    #[error("Report stream broken: {0}")]
    Stream(String),

    #[error("Execution backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    // === Report Errors ===
    #[error("Failed to write report '{path}': {error}")]
    Materialization { path: String, error: String },

    // === Run Errors ===
    #[error("{failed} of {total} scenario(s) did not end with the expected status")]
    UnexpectedStatus { failed: usize, total: usize },

    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed { failed: usize, total: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a submission error from anything displayable
    pub fn submission(reason: impl std::fmt::Display) -> Self {
        Self::Submission(reason.to_string())
    }

    /// Create a stream error from anything displayable
    pub fn stream(reason: impl std::fmt::Display) -> Self {
        Self::Stream(reason.to_string())
    }

    /// Create a materialization error for a report path
    pub fn materialization(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::Materialization {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}

/// Why an environment could not be resolved for a scenario
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("environment '{name}' not found")]
    NotFound { name: String },

    #[error("no environment named and several are defined ({}); name one explicitly", candidates.join(", "))]
    Ambiguous { candidates: Vec<String> },

    #[error("no environment defined")]
    NoneDefined,

    #[error("invalid environment file '{path}': {error}")]
    Invalid { path: String, error: String },
}

/// A discovery problem isolated to a single selector
///
/// Issues never abort a discovery session; they are collected and
/// returned next to the discovered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryIssue {
    /// Rendered selector that produced the issue
    pub selector: String,
    /// Fully-qualified source location (class or class#method)
    pub source: String,
    pub message: String,
}

impl std::fmt::Display for DiscoveryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.source, self.selector, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_environment_lists_candidates() {
        let err = EnvironmentError::Ambiguous {
            candidates: vec!["DEV".to_string(), "PROD".to_string()],
        };
        assert!(err.to_string().contains("DEV, PROD"));
    }

    #[test]
    fn test_environment_error_converts() {
        let err: Error = EnvironmentError::NotFound {
            name: "QA".to_string(),
        }
        .into();
        assert!(matches!(err, Error::EnvironmentResolution(_)));
        assert!(err.to_string().contains("'QA'"));
    }
}
