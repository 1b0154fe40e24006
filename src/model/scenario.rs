//! Scenario definitions
//!
//! Immutable given/when/then step trees as produced by the scenario DSL
//! (or deserialized from scenario files). Execution state never lives
//! here; it lives in [`super::report`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Strategy type identifying retry-with-timeout steps
pub const RETRY_WITH_TIMEOUT: &str = "retry-with-timeout";

/// A complete scenario: ordered givens, exactly one when, ordered thens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub title: String,
    /// Stable numeric identity, when the scenario is stored server-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<String>,
    #[serde(default)]
    pub givens: Vec<Step>,
    pub when: Step,
    #[serde(default)]
    pub thens: Vec<Step>,
}

impl ScenarioDefinition {
    /// Create a scenario with a single `when` step
    pub fn new(title: impl Into<String>, when: Step) -> Self {
        Self {
            title: title.into(),
            id: None,
            tags: Vec::new(),
            default_dataset: None,
            givens: Vec::new(),
            when,
            thens: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn given(mut self, step: Step) -> Self {
        self.givens.push(step);
        self
    }

    pub fn then(mut self, step: Step) -> Self {
        self.thens.push(step);
        self
    }

    /// Top-level steps in execution order: givens, when, thens
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.givens
            .iter()
            .chain(std::iter::once(&self.when))
            .chain(self.thens.iter())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A node of a scenario tree: a leaf action invocation or a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Implementation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, alias = "steps")]
    pub sub_steps: Vec<Step>,
}

impl Step {
    /// A leaf step invoking an action
    pub fn action(description: impl Into<String>, implementation: Implementation) -> Self {
        Self {
            description: description.into(),
            implementation: Some(implementation),
            strategy: None,
            sub_steps: Vec::new(),
        }
    }

    /// A purely structural step grouping sub-steps
    pub fn group(description: impl Into<String>, sub_steps: Vec<Step>) -> Self {
        Self {
            description: description.into(),
            implementation: None,
            strategy: None,
            sub_steps,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_sub_steps(mut self, sub_steps: Vec<Step>) -> Self {
        self.sub_steps = sub_steps;
        self
    }

    pub fn is_retry(&self) -> bool {
        self.strategy.as_ref().is_some_and(Strategy::is_retry)
    }
}

/// Action invocation carried by a leaf step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Action type name (e.g. `http-get`, `sql`)
    #[serde(rename = "type")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub validations: BTreeMap<String, Value>,
}

impl Implementation {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            validations: BTreeMap::new(),
        }
    }

    pub fn on_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }
}

/// Named execution modifier attached to a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Strategy {
    /// Retry the step until it succeeds or `time_out` elapses
    pub fn retry_with_timeout(time_out: impl Into<String>, retry_delay: impl Into<String>) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("timeOut".to_string(), time_out.into());
        parameters.insert("retryDelay".to_string(), retry_delay.into());
        Self {
            kind: RETRY_WITH_TIMEOUT.to_string(),
            parameters,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.kind == RETRY_WITH_TIMEOUT
    }
}
