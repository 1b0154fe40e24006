//! Scenario discovery
//!
//! Turns selectors over a [`ScenarioCatalog`] into a single [`TestNode`]
//! tree: engine root, one node per class-scope, one per scenario and, when
//! steps are tests, one per step. Problems with a single selector or
//! producer are collected as [`DiscoveryIssue`]s and never abort the
//! session. Nothing here talks to an execution backend.

pub mod catalog;
pub mod descriptor;
pub mod loader;
pub mod selector;

pub use catalog::{ClassSource, Producer, ProducerOutput, ScenarioCatalog};
pub use descriptor::{NodeKind, NodeSource, ScenarioSource, TestNode, UniqueId};
pub use selector::{Selector, TagFilter};

use std::sync::Arc;

use crate::common::DiscoveryIssue;
use descriptor::{build_class_node, build_engine_node, build_scenario_node};

/// What to discover
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequest {
    pub selectors: Vec<Selector>,
    pub tags: TagFilter,
}

impl DiscoveryRequest {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self {
            selectors,
            tags: TagFilter::default(),
        }
    }

    /// Everything in the catalog
    pub fn all() -> Self {
        Self::new(vec![Selector::all()])
    }

    pub fn with_tags(mut self, tags: TagFilter) -> Self {
        self.tags = tags;
        self
    }
}

/// Discovered tree plus the issues met on the way
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub root: TestNode,
    pub issues: Vec<DiscoveryIssue>,
}

/// Which producers of a class were selected
#[derive(Debug)]
enum Selection {
    All,
    Only(Vec<String>),
}

#[derive(Debug)]
struct PlannedClass {
    name: String,
    /// First selector that picked the class
    selector: String,
    selection: Selection,
}

/// Discovers scenario nodes from a catalog
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    catalog: Arc<ScenarioCatalog>,
    step_as_test: bool,
}

impl DiscoveryEngine {
    pub fn new(catalog: Arc<ScenarioCatalog>, step_as_test: bool) -> Self {
        Self {
            catalog,
            step_as_test,
        }
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    pub fn discover(&self, request: &DiscoveryRequest) -> DiscoveryOutcome {
        let mut issues = Vec::new();
        let plan = self.plan(&request.selectors, &mut issues);
        let root_id = UniqueId::engine(descriptor::ENGINE_ID);

        let mut classes = Vec::with_capacity(plan.len());
        for planned in &plan {
            // Planned classes always exist in the catalog
            let Some(class) = self.catalog.class(&planned.name) else {
                continue;
            };

            if let Some(error) = &class.load_error {
                issues.push(DiscoveryIssue {
                    selector: planned.selector.clone(),
                    source: class.name.clone(),
                    message: error.clone(),
                });
                continue;
            }

            let class_id = root_id.append("class", &class.name);
            let mut scenarios = Vec::new();
            for producer in &class.producers {
                let selected = match &planned.selection {
                    Selection::All => true,
                    Selection::Only(names) => names.contains(&producer.name),
                };
                if selected {
                    self.build_producer(
                        class,
                        producer,
                        &class_id,
                        request,
                        &planned.selector,
                        &mut scenarios,
                        &mut issues,
                    );
                }
            }

            if scenarios.is_empty() {
                tracing::debug!(class = %class.name, "No scenario left in class, pruned");
                continue;
            }
            classes.push(build_class_node(&root_id, &class.name, scenarios));
        }

        for issue in &issues {
            tracing::warn!(source = %issue.source, selector = %issue.selector, "Discovery issue: {}", issue.message);
        }

        let root = build_engine_node(classes);
        tracing::debug!(
            classes = root.children.len(),
            scenarios = root.scenario_count(),
            issues = issues.len(),
            step_as_test = self.step_as_test,
            "Discovery finished"
        );
        DiscoveryOutcome { root, issues }
    }

    /// Resolve selectors to classes, in selector order then catalog order
    fn plan(&self, selectors: &[Selector], issues: &mut Vec<DiscoveryIssue>) -> Vec<PlannedClass> {
        let mut plan: Vec<PlannedClass> = Vec::new();

        fn select(plan: &mut Vec<PlannedClass>, name: &str, selector: &Selector, method: Option<&str>) {
            let existing = plan.iter_mut().find(|p| p.name == name);
            match (existing, method) {
                (Some(planned), None) => planned.selection = Selection::All,
                (Some(planned), Some(method)) => {
                    if let Selection::Only(names) = &mut planned.selection {
                        if !names.iter().any(|n| n == method) {
                            names.push(method.to_string());
                        }
                    }
                }
                (None, method) => plan.push(PlannedClass {
                    name: name.to_string(),
                    selector: selector.to_string(),
                    selection: match method {
                        Some(m) => Selection::Only(vec![m.to_string()]),
                        None => Selection::All,
                    },
                }),
            }
        }

        for selector in selectors {
            match selector {
                Selector::Package(package) => {
                    let mut matched = false;
                    for class in self.catalog.classes().iter().filter(|c| c.in_package(package)) {
                        select(&mut plan, &class.name, selector, None);
                        matched = true;
                    }
                    if !matched && !package.is_empty() {
                        tracing::debug!(package = %package, "Package selector matched no class");
                    }
                }
                Selector::Class(name) => {
                    if self.catalog.class(name).is_some() {
                        select(&mut plan, name, selector, None);
                    } else {
                        issues.push(DiscoveryIssue {
                            selector: selector.to_string(),
                            source: name.clone(),
                            message: "class not found".to_string(),
                        });
                    }
                }
                Selector::Method { class, method } => {
                    let found = self
                        .catalog
                        .class(class)
                        .map(|c| c.load_error.is_some() || c.producer(method).is_some());
                    match found {
                        Some(true) => select(&mut plan, class, selector, Some(method)),
                        Some(false) => issues.push(DiscoveryIssue {
                            selector: selector.to_string(),
                            source: format!("{}#{}", class, method),
                            message: "no scenario producer with this name".to_string(),
                        }),
                        None => issues.push(DiscoveryIssue {
                            selector: selector.to_string(),
                            source: class.clone(),
                            message: "class not found".to_string(),
                        }),
                    }
                }
            }
        }
        plan
    }

    #[allow(clippy::too_many_arguments)]
    fn build_producer(
        &self,
        class: &ClassSource,
        producer: &Producer,
        class_id: &UniqueId,
        request: &DiscoveryRequest,
        selector: &str,
        out: &mut Vec<TestNode>,
        issues: &mut Vec<DiscoveryIssue>,
    ) {
        let instances: Vec<(String, _)> = match producer.produce() {
            ProducerOutput::Single(scenario) => vec![(producer.name.clone(), scenario)],
            ProducerOutput::Many(scenarios) => scenarios
                .into_iter()
                .enumerate()
                .map(|(i, s)| (format!("{}#{}", producer.name, i + 1), s))
                .collect(),
            ProducerOutput::Unsupported { type_name } => {
                issues.push(DiscoveryIssue {
                    selector: selector.to_string(),
                    source: format!("{}#{}", class.name, producer.name),
                    message: format!(
                        "producer returned {} instead of a scenario or a list of scenarios",
                        type_name
                    ),
                });
                return;
            }
        };

        for (segment, scenario) in instances {
            if !request.tags.accepts(&scenario) {
                tracing::debug!(scenario = %scenario.title, "Excluded by tag filter");
                continue;
            }
            let source = ScenarioSource {
                definition: Arc::new(scenario),
                class_name: class.name.clone(),
                producer: producer.name.clone(),
                environment: producer.environment.clone(),
            };
            out.push(build_scenario_node(class_id, &segment, source, self.step_as_test));
        }
    }
}
