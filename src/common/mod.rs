//! Common utilities shared by discovery, orchestration and the CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{DiscoveryIssue, EnvironmentError, Error, Result};
