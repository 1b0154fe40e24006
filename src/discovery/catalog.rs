//! Scenario producers grouped by source class
//!
//! A [`ClassSource`] is the unit of discovery (and later of bounded
//! concurrency). Each of its [`Producer`]s yields one or more scenarios
//! when asked, or something that cannot be read as scenarios at all.

use std::fmt;
use std::sync::Arc;

use crate::model::ScenarioDefinition;

/// What a producer returned
#[derive(Debug, Clone)]
pub enum ProducerOutput {
    Single(ScenarioDefinition),
    Many(Vec<ScenarioDefinition>),
    /// The returned value is not a scenario nor a collection of them
    Unsupported { type_name: String },
}

type ProduceFn = dyn Fn() -> ProducerOutput + Send + Sync;

/// A named scenario-producing definition
#[derive(Clone)]
pub struct Producer {
    pub name: String,
    /// Environment requested by the definition itself
    pub environment: Option<String>,
    produce: Arc<ProduceFn>,
}

impl Producer {
    pub fn new<F>(name: impl Into<String>, produce: F) -> Self
    where
        F: Fn() -> ProducerOutput + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            environment: None,
            produce: Arc::new(produce),
        }
    }

    /// A producer always returning the same scenario
    pub fn single(name: impl Into<String>, scenario: ScenarioDefinition) -> Self {
        Self::new(name, move || ProducerOutput::Single(scenario.clone()))
    }

    /// A producer always returning the same ordered scenarios
    pub fn many(name: impl Into<String>, scenarios: Vec<ScenarioDefinition>) -> Self {
        Self::new(name, move || ProducerOutput::Many(scenarios.clone()))
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn produce(&self) -> ProducerOutput {
        (self.produce)()
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Scenario producers declared by one source class or file
#[derive(Debug, Clone)]
pub struct ClassSource {
    /// Fully-qualified name, `.`-separated
    pub name: String,
    pub producers: Vec<Producer>,
    /// Set when the source could not be read; discovery reports it
    pub load_error: Option<String>,
}

impl ClassSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            producers: Vec::new(),
            load_error: None,
        }
    }

    pub fn broken(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            load_error: Some(error.into()),
            ..Self::new(name)
        }
    }

    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producers.push(producer);
        self
    }

    /// Last segment of the fully-qualified name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether this class lives under `package` (the empty package holds all)
    pub fn in_package(&self, package: &str) -> bool {
        package.is_empty()
            || self
                .name
                .strip_prefix(package)
                .is_some_and(|rest| rest.starts_with('.'))
    }

    pub fn producer(&self, name: &str) -> Option<&Producer> {
        self.producers.iter().find(|p| p.name == name)
    }
}

/// Every class discovery can see, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    classes: Vec<ClassSource>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class; a class with the same name is replaced in place
    pub fn add(&mut self, class: ClassSource) {
        match self.classes.iter_mut().find(|c| c.name == class.name) {
            Some(existing) => *existing = class,
            None => self.classes.push(class),
        }
    }

    pub fn with_class(mut self, class: ClassSource) -> Self {
        self.add(class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassSource> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn classes(&self) -> &[ClassSource] {
        &self.classes
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
