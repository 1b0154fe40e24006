//! Scenario, report and environment types shared by every component

pub mod environment;
pub mod report;
pub mod scenario;

pub use environment::{Environment, Target};
pub use report::{ExecutionId, ExecutionReport, Status, StepReport, Verdict};
pub use scenario::{Implementation, ScenarioDefinition, Step, Strategy, RETRY_WITH_TIMEOUT};
