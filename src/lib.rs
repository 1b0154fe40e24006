//! Chutney engine - scenario discovery and execution orchestration
//!
//! Discovers given/when/then scenarios, exposes them as a test node tree
//! to a host test-runner, and drives their execution on a backend with
//! bounded concurrency per class-scope.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod common;
pub mod discovery;
pub mod engine;
pub mod launcher;
pub mod model;
pub mod report;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{ChutneyEngine, EngineSettings, ExecutionListener, ExecutionRequest, TestEngine, TestResult};
