//! Execution backend client
//!
//! The orchestrator never runs steps itself. It submits a scenario to an
//! [`ExecutionBackend`] and consumes the stream of report snapshots the
//! backend publishes until a terminal one arrives.

pub mod environments;
pub mod http;
pub mod scripted;
pub mod sse;

pub use environments::EnvironmentDirectory;
pub use http::HttpBackend;
pub use scripted::ScriptedBackend;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::common::{Error, Result};
use crate::model::{Environment, ExecutionId, ExecutionReport, ScenarioDefinition};

/// Ordered report snapshots of one execution, ending with a terminal one
pub type ReportStream = BoxStream<'static, Result<ExecutionReport>>;

/// A service able to run scenarios and report on them
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Start an execution; returns once the backend accepted it
    async fn submit(
        &self,
        scenario: &ScenarioDefinition,
        environment: &Environment,
        constants: &BTreeMap<String, String>,
        dataset: Option<&str>,
    ) -> Result<ExecutionId>;

    /// Snapshots of a submitted execution
    async fn notifications(&self, execution_id: ExecutionId) -> Result<ReportStream>;

    /// Environment used when a scenario names none
    async fn default_environment_name(&self) -> Result<String>;

    async fn resolve_environment(&self, name: &str) -> Result<Environment>;

    /// Submit and wait for the last snapshot
    async fn run_and_wait_final(
        &self,
        scenario: &ScenarioDefinition,
        environment: &Environment,
    ) -> Result<ExecutionReport> {
        let execution_id = self
            .submit(scenario, environment, &BTreeMap::new(), scenario.default_dataset.as_deref())
            .await?;
        let mut stream = self.notifications(execution_id).await?;

        let mut last = None;
        while let Some(report) = stream.next().await {
            last = Some(report?);
        }
        last.ok_or_else(|| {
            Error::stream(format!("execution {} ended without any report", execution_id))
        })
    }
}
