//! Host test-runner SPI and its Chutney implementation
//!
//! A host runner calls [`TestEngine::discover`] to get a node tree, may
//! drop parts of it, then calls [`TestEngine::execute`] with a listener
//! that receives started/finished events per node.

pub mod context;
pub mod orchestrator;
pub mod progress;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::ExecutionBackend;
use crate::common::config::Config;
use crate::discovery::{DiscoveryEngine, DiscoveryOutcome, DiscoveryRequest, ScenarioCatalog, TestNode, UniqueId};
use crate::model::{ExecutionReport, Verdict};
use crate::report::ReportWriter;

/// Terminal outcome of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub verdict: Verdict,
    pub diagnostic: Option<String>,
}

impl TestResult {
    pub fn success() -> Self {
        Self {
            verdict: Verdict::Success,
            diagnostic: None,
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Failure,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn from_verdict(verdict: Verdict) -> Self {
        Self {
            verdict,
            diagnostic: None,
        }
    }
}

/// Receives lifecycle events during execution
///
/// Calls for one class-scope arrive in order; calls for different
/// class-scopes may interleave.
pub trait ExecutionListener: Send + Sync {
    fn execution_started(&self, node: &TestNode);

    fn execution_finished(&self, node: &TestNode, result: &TestResult);

    fn execution_skipped(&self, node: &TestNode, reason: &str) {
        let _ = (node, reason);
    }

    /// Final report of a scenario, before its finished event
    fn report_published(&self, node: &TestNode, report: &ExecutionReport) {
        let _ = (node, report);
    }
}

/// A tree to execute and where to send events
#[derive(Clone)]
pub struct ExecutionRequest {
    pub root: Arc<TestNode>,
    pub listener: Arc<dyn ExecutionListener>,
    /// Class or scenario nodes the host dropped after discovery
    pub skip: HashSet<UniqueId>,
}

impl ExecutionRequest {
    pub fn new(root: Arc<TestNode>, listener: Arc<dyn ExecutionListener>) -> Self {
        Self {
            root,
            listener,
            skip: HashSet::new(),
        }
    }

    pub fn skipping(mut self, ids: impl IntoIterator<Item = UniqueId>) -> Self {
        self.skip.extend(ids);
        self
    }
}

/// Host test-runner SPI
#[async_trait]
pub trait TestEngine: Send + Sync {
    fn id(&self) -> &str;

    fn discover(&self, request: &DiscoveryRequest) -> DiscoveryOutcome;

    async fn execute(&self, request: ExecutionRequest);
}

/// Settings read once per engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub step_as_test: bool,
    /// Scenarios allowed to run at once inside one class-scope
    pub concurrency: usize,
    /// Report sink, none to keep reports in memory only
    pub writer: Option<ReportWriter>,
    /// Constants passed with every submission
    pub constants: BTreeMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            step_as_test: true,
            concurrency: 1,
            writer: None,
            constants: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            step_as_test: config.engine.step_as_test,
            concurrency: config.engine.concurrency,
            writer: Some(ReportWriter::new(&config.paths.report_root)),
            constants: BTreeMap::new(),
        }
    }
}

/// Discovers scenarios from a catalog and runs them on a backend
pub struct ChutneyEngine {
    discovery: DiscoveryEngine,
    backend: Arc<dyn ExecutionBackend>,
    settings: Arc<EngineSettings>,
}

impl ChutneyEngine {
    pub fn new(catalog: Arc<ScenarioCatalog>, backend: Arc<dyn ExecutionBackend>, settings: EngineSettings) -> Self {
        Self {
            discovery: DiscoveryEngine::new(catalog, settings.step_as_test),
            backend,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

#[async_trait]
impl TestEngine for ChutneyEngine {
    fn id(&self) -> &str {
        crate::discovery::descriptor::ENGINE_ID
    }

    fn discover(&self, request: &DiscoveryRequest) -> DiscoveryOutcome {
        self.discovery.discover(request)
    }

    async fn execute(&self, request: ExecutionRequest) {
        orchestrator::execute(request, Arc::clone(&self.backend), Arc::clone(&self.settings)).await
    }
}
