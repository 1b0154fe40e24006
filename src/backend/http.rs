//! Remote execution backend over HTTP
//!
//! * `POST {base}/api/v1/executions` with `{scenario, environment,
//!   constants, dataset}` answers `{"executionId": 12}`
//! * `GET {base}/api/v1/executions/12/reports` is an event stream whose
//!   `data` payloads are [`ExecutionReport`] snapshots; an `error` event
//!   carries a backend-side failure message
//!
//! Environments are resolved locally from an [`EnvironmentDirectory`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::environments::EnvironmentDirectory;
use super::sse::{SseDecoder, SseEvent};
use super::{ExecutionBackend, ReportStream};
use crate::common::config::BackendConfig;
use crate::common::{Error, Result};
use crate::model::{Environment, ExecutionId, ExecutionReport, ScenarioDefinition};

const USER_AGENT: &str = concat!("chutney-engine/", env!("CARGO_PKG_VERSION"));

/// Snapshots buffered between the HTTP reader task and the consumer
const STREAM_BUFFER: usize = 32;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    scenario: &'a ScenarioDefinition,
    environment: &'a Environment,
    constants: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    execution_id: ExecutionId,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    environments: EnvironmentDirectory,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, environments: EnvironmentDirectory) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
            environments,
        }
    }

    pub fn from_config(config: &BackendConfig, environments: EnvironmentDirectory) -> Self {
        Self::new(&config.url, environments)
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    /// Timeout for submission only; report streams are never cut short
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    async fn submit(
        &self,
        scenario: &ScenarioDefinition,
        environment: &Environment,
        constants: &BTreeMap<String, String>,
        dataset: Option<&str>,
    ) -> Result<ExecutionId> {
        let url = self.url("executions");
        tracing::debug!(url = %url, scenario = %scenario.title, environment = %environment.name, "Submitting scenario");

        let response = self
            .client
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .timeout(self.request_timeout)
            .json(&SubmitRequest {
                scenario,
                environment,
                constants,
                dataset,
            })
            .send()
            .await
            .map_err(|e| Error::submission(format!("{} unreachable: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::submission(format!(
                "backend answered {}: {}",
                status,
                body.trim()
            )));
        }

        let accepted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::submission(format!("invalid submission response: {}", e)))?;
        Ok(accepted.execution_id)
    }

    async fn notifications(&self, execution_id: ExecutionId) -> Result<ReportStream> {
        let url = self.url(&format!("executions/{}/reports", execution_id));
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::stream(format!("{} unreachable: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::stream(format!(
                "report stream for execution {} answered {}",
                execution_id,
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(Error::stream(e))).await;
                        return;
                    }
                };
                for event in decoder.push(&chunk) {
                    if tx.send(decode_event(event)).await.is_err() {
                        // Consumer went away
                        return;
                    }
                }
            }
            if let Some(event) = decoder.finish() {
                let _ = tx.send(decode_event(event)).await;
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn default_environment_name(&self) -> Result<String> {
        self.environments.default_name()
    }

    async fn resolve_environment(&self, name: &str) -> Result<Environment> {
        self.environments.resolve(name)
    }
}

fn decode_event(event: SseEvent) -> Result<ExecutionReport> {
    if event.event.as_deref() == Some("error") {
        return Err(Error::stream(event.data));
    }
    serde_json::from_str(&event.data)
        .map_err(|e| Error::stream(format!("invalid report snapshot: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8443/", EnvironmentDirectory::new("."));
        assert_eq!(backend.url("executions"), "http://localhost:8443/api/v1/executions");
    }

    #[test]
    fn test_decode_report_event() {
        let event = SseEvent {
            event: Some("report".to_string()),
            id: None,
            data: r#"{"executionId":3,"scenarioName":"s","status":"RUNNING","report":{"name":"root","status":"RUNNING"}}"#
                .to_string(),
        };
        let report = decode_event(event).unwrap();
        assert_eq!(report.execution_id, 3);
        assert_eq!(report.status, Status::Running);
        assert_eq!(report.report.name, "root");
    }

    #[test]
    fn test_decode_error_event() {
        let event = SseEvent {
            event: Some("error".to_string()),
            id: None,
            data: "engine crashed".to_string(),
        };
        match decode_event(event) {
            Err(Error::Stream(message)) => assert_eq!(message, "engine crashed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_submit_body_shape() {
        let scenario = ScenarioDefinition::new("s", crate::model::Step::group("when", vec![]));
        let environment = Environment::new("DEV");
        let constants = BTreeMap::from([("k".to_string(), "v".to_string())]);
        let body = serde_json::to_value(SubmitRequest {
            scenario: &scenario,
            environment: &environment,
            constants: &constants,
            dataset: None,
        })
        .unwrap();
        assert_eq!(body["scenario"]["title"], "s");
        assert_eq!(body["environment"]["name"], "DEV");
        assert_eq!(body["constants"]["k"], "v");
        assert!(body.get("dataset").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_submission_error() {
        let backend = HttpBackend::new("http://127.0.0.1:9", EnvironmentDirectory::new("."))
            .with_request_timeout(Duration::from_secs(2));
        let scenario = ScenarioDefinition::new("s", crate::model::Step::group("when", vec![]));
        let result = backend
            .submit(&scenario, &Environment::new("DEV"), &BTreeMap::new(), None)
            .await;
        assert!(matches!(result, Err(Error::Submission(_))));
    }
}
