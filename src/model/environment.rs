//! Execution environments and their targets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named set of targets a scenario runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            targets: Vec::new(),
        }
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// A system under test reachable at `url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
