//! Test node tree and the scenario/step descriptor builder
//!
//! [`TestNode`] is the neutral node vocabulary handed to host runners.
//! [`NodeKind::for_step`] is the single place that decides whether a step
//! is a container, a test, or both.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::model::{ScenarioDefinition, Step};

/// Engine identifier used as the root id segment
pub const ENGINE_ID: &str = "chutney";

/// Hierarchical node id rendered as `[engine:chutney]/[class:a.B]/...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId {
    segments: Vec<(String, String)>,
}

impl UniqueId {
    pub fn engine(engine_id: &str) -> Self {
        Self {
            segments: vec![("engine".to_string(), engine_id.to_string())],
        }
    }

    /// A child id with one more segment
    pub fn append(&self, kind: &str, value: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push((kind.to_string(), value.into()));
        Self { segments }
    }

    pub fn segments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn last(&self) -> (&str, &str) {
        self.segments
            .last()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .unwrap_or(("", ""))
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn starts_with(&self, other: &UniqueId) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, value)) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "[{}:{}]", kind, value)?;
        }
        Ok(())
    }
}

impl Serialize for UniqueId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a host runner should treat a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Container,
    Test,
    ContainerAndTest,
}

impl NodeKind {
    /// Kind of a step node from its shape
    ///
    /// | implementation | sub-steps | kind               |
    /// |----------------|-----------|--------------------|
    /// | yes            | none      | Test               |
    /// | no             | any       | Container          |
    /// | yes            | some      | ContainerAndTest   |
    pub fn for_step(has_implementation: bool, sub_step_count: usize) -> Self {
        match (has_implementation, sub_step_count) {
            (true, 0) => NodeKind::Test,
            (false, _) => NodeKind::Container,
            (true, _) => NodeKind::ContainerAndTest,
        }
    }

    pub fn is_test(self) -> bool {
        matches!(self, NodeKind::Test | NodeKind::ContainerAndTest)
    }

    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Container | NodeKind::ContainerAndTest)
    }
}

/// Where a scenario node came from
#[derive(Debug, Clone)]
pub struct ScenarioSource {
    pub definition: Arc<ScenarioDefinition>,
    /// Fully-qualified class name
    pub class_name: String,
    pub producer: String,
    /// Environment requested at the definition, resolved later if absent
    pub environment: Option<String>,
}

/// Back-reference from a node to what it describes
#[derive(Debug, Clone)]
pub enum NodeSource {
    Engine,
    Class { name: String },
    Scenario(ScenarioSource),
    /// Step at `path` (positions from the scenario's top-level steps down)
    Step {
        scenario: Arc<ScenarioDefinition>,
        path: Vec<usize>,
    },
}

impl NodeSource {
    /// Resolve a step back-reference
    pub fn step(&self) -> Option<&Step> {
        match self {
            NodeSource::Step { scenario, path } => {
                let (first, rest) = path.split_first()?;
                let mut step = scenario.steps().nth(*first)?;
                for index in rest {
                    step = step.sub_steps.get(*index)?;
                }
                Some(step)
            }
            _ => None,
        }
    }
}

/// A discovered node; immutable once built
#[derive(Debug, Clone)]
pub struct TestNode {
    pub id: UniqueId,
    pub display_name: String,
    pub kind: NodeKind,
    pub source: NodeSource,
    /// Governed by a retry-with-timeout strategy
    pub retryable: bool,
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn scenario(&self) -> Option<&ScenarioSource> {
        match &self.source {
            NodeSource::Scenario(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_scenario(&self) -> bool {
        self.scenario().is_some()
    }

    /// Depth-first search by id
    pub fn find(&self, id: &UniqueId) -> Option<&TestNode> {
        if &self.id == id {
            return Some(self);
        }
        if !id.starts_with(&self.id) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// This node and all descendants, pre-order
    pub fn descendants(&self) -> Vec<&TestNode> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a TestNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }

    pub fn scenario_count(&self) -> usize {
        self.descendants().iter().filter(|n| n.is_scenario()).count()
    }
}

/// The engine root
pub fn build_engine_node(children: Vec<TestNode>) -> TestNode {
    TestNode {
        id: UniqueId::engine(ENGINE_ID),
        display_name: "Chutney".to_string(),
        kind: NodeKind::Container,
        source: NodeSource::Engine,
        retryable: false,
        children,
    }
}

/// A class-scope container
pub fn build_class_node(parent: &UniqueId, class_name: &str, children: Vec<TestNode>) -> TestNode {
    TestNode {
        id: parent.append("class", class_name),
        display_name: class_name.rsplit('.').next().unwrap_or(class_name).to_string(),
        kind: NodeKind::Container,
        source: NodeSource::Class {
            name: class_name.to_string(),
        },
        retryable: false,
        children,
    }
}

/// A scenario node, with step nodes underneath when steps are tests
///
/// `segment` identifies the scenario inside its class (producer name, plus
/// an instance suffix for producers returning several scenarios).
pub fn build_scenario_node(
    parent: &UniqueId,
    segment: &str,
    source: ScenarioSource,
    step_as_test: bool,
) -> TestNode {
    let id = parent.append("scenario", segment);
    let definition = Arc::clone(&source.definition);

    let (kind, children) = if step_as_test {
        let children = definition
            .steps()
            .enumerate()
            .map(|(rank, step)| build_step_node(&definition, step, vec![rank], &id))
            .collect();
        (NodeKind::ContainerAndTest, children)
    } else {
        (NodeKind::Test, Vec::new())
    };

    TestNode {
        id,
        display_name: definition.title.clone(),
        kind,
        source: NodeSource::Scenario(source),
        retryable: false,
        children,
    }
}

/// A step node and its sub-step nodes
///
/// Ids are positional (`[step:<rank>]`), so editing a step's content
/// keeps ids while adding or removing a sibling renumbers that subtree.
pub fn build_step_node(
    scenario: &Arc<ScenarioDefinition>,
    step: &Step,
    path: Vec<usize>,
    parent: &UniqueId,
) -> TestNode {
    let rank = path.last().copied().unwrap_or_default();
    let id = parent.append("step", rank.to_string());

    let children = step
        .sub_steps
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            let mut sub_path = path.clone();
            sub_path.push(index);
            build_step_node(scenario, sub, sub_path, &id)
        })
        .collect();

    TestNode {
        id,
        display_name: step.description.clone(),
        kind: NodeKind::for_step(step.implementation.is_some(), step.sub_steps.len()),
        source: NodeSource::Step {
            scenario: Arc::clone(scenario),
            path,
        },
        retryable: step.is_retry(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Implementation, Strategy as StepStrategy};
    use proptest::prelude::*;

    fn scenario() -> Arc<ScenarioDefinition> {
        Arc::new(
            ScenarioDefinition::new(
                "Search",
                Step::group(
                    "search",
                    vec![
                        Step::action("type", Implementation::new("selenium-send-keys")),
                        Step::action("submit", Implementation::new("selenium-click")),
                    ],
                )
                .with_strategy(StepStrategy::retry_with_timeout("5 s", "1 s")),
            )
            .given(Step::action("open", Implementation::new("selenium-get")))
            .then(Step::action("check", Implementation::new("compare"))),
        )
    }

    fn source(definition: Arc<ScenarioDefinition>) -> ScenarioSource {
        ScenarioSource {
            definition,
            class_name: "web.Search".to_string(),
            producer: "search".to_string(),
            environment: None,
        }
    }

    #[test]
    fn test_unique_id_rendering() {
        let id = UniqueId::engine(ENGINE_ID)
            .append("class", "web.Search")
            .append("scenario", "search");
        assert_eq!(id.to_string(), "[engine:chutney]/[class:web.Search]/[scenario:search]");
        assert_eq!(id.last(), ("scenario", "search"));
        assert!(id.starts_with(&UniqueId::engine(ENGINE_ID)));
    }

    #[test]
    fn test_scenario_node_with_steps() {
        let root = UniqueId::engine(ENGINE_ID).append("class", "web.Search");
        let node = build_scenario_node(&root, "search", source(scenario()), true);

        assert_eq!(node.kind, NodeKind::ContainerAndTest);
        assert_eq!(node.display_name, "Search");
        let names: Vec<&str> = node.children.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, ["open", "search", "check"]);

        let when = &node.children[1];
        assert_eq!(when.kind, NodeKind::Container);
        assert!(when.retryable);
        assert_eq!(
            when.children[1].id.to_string(),
            "[engine:chutney]/[class:web.Search]/[scenario:search]/[step:1]/[step:1]"
        );
        assert_eq!(when.children[1].source.step().unwrap().description, "submit");
        assert!(!when.children[1].retryable);
    }

    #[test]
    fn test_scenario_node_without_step_tests() {
        let root = UniqueId::engine(ENGINE_ID);
        let node = build_scenario_node(&root, "search", source(scenario()), false);
        assert_eq!(node.kind, NodeKind::Test);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_ids_survive_content_edits() {
        let root = UniqueId::engine(ENGINE_ID);
        let before = build_scenario_node(&root, "s", source(scenario()), true);

        let mut edited = (*scenario()).clone();
        edited.givens[0].description = "open the home page".to_string();
        let after = build_scenario_node(&root, "s", source(Arc::new(edited.clone())), true);

        let ids = |n: &TestNode| n.descendants().iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));

        edited.givens.push(Step::action("login", Implementation::new("http-post")));
        let grown = build_scenario_node(&root, "s", source(Arc::new(edited)), true);
        assert_eq!(grown.children.len(), 4);
        assert_eq!(grown.children[1].display_name, "login");
        assert_eq!(grown.children[0].id, before.children[0].id);
    }

    #[test]
    fn test_find_and_descendants() {
        let root = UniqueId::engine(ENGINE_ID);
        let node = build_scenario_node(&root, "s", source(scenario()), true);
        let target = node.children[1].children[0].id.clone();
        assert_eq!(node.find(&target).unwrap().display_name, "type");
        assert_eq!(node.descendants().len(), 6);
        assert_eq!(node.scenario_count(), 1);
    }

    #[test]
    fn test_engine_injected_step_is_container_and_test() {
        let step = Step::action("debug", Implementation::new("debug"))
            .with_sub_steps(vec![Step::action("inner", Implementation::new("debug"))]);
        let definition = Arc::new(ScenarioDefinition::new("s", step.clone()));
        let node = build_step_node(&definition, &step, vec![0], &UniqueId::engine(ENGINE_ID));
        assert_eq!(node.kind, NodeKind::ContainerAndTest);
        assert!(node.kind.is_test() && node.kind.is_container());
    }

    fn step_tree() -> impl Strategy<Value = Step> {
        let leaf = any::<bool>().prop_map(|has_impl| Step {
            description: "leaf".to_string(),
            implementation: has_impl.then(|| Implementation::new("debug")),
            strategy: None,
            sub_steps: Vec::new(),
        });
        leaf.prop_recursive(4, 40, 4, |inner| {
            (any::<bool>(), any::<bool>(), prop::collection::vec(inner, 0..4)).prop_map(
                |(has_impl, retry, sub_steps)| Step {
                    description: "node".to_string(),
                    implementation: has_impl.then(|| Implementation::new("debug")),
                    strategy: retry.then(|| StepStrategy::retry_with_timeout("1 s", "100 ms")),
                    sub_steps,
                },
            )
        })
    }

    fn check(node: &TestNode) -> std::result::Result<(), TestCaseError> {
        let step = node.source.step().expect("step node resolves its step");
        let expected = match (step.implementation.is_some(), step.sub_steps.is_empty()) {
            (true, true) => NodeKind::Test,
            (false, _) => NodeKind::Container,
            (true, false) => NodeKind::ContainerAndTest,
        };
        prop_assert_eq!(node.kind, expected);
        prop_assert_eq!(node.retryable, step.is_retry());
        prop_assert_eq!(node.children.len(), step.sub_steps.len());
        for child in &node.children {
            check(child)?;
        }
        Ok(())
    }

    proptest! {
        /// Property: node kind and retry tag are pure functions of the step shape.
        #[test]
        fn prop_kind_follows_step_shape(step in step_tree()) {
            let definition = Arc::new(ScenarioDefinition::new("s", step.clone()));
            let node = build_step_node(&definition, &step, vec![0], &UniqueId::engine(ENGINE_ID));
            check(&node)?;
        }

        /// Property: rebuilding the same tree yields the same ids.
        #[test]
        fn prop_ids_are_deterministic(step in step_tree()) {
            let definition = Arc::new(ScenarioDefinition::new("s", step.clone()));
            let parent = UniqueId::engine(ENGINE_ID);
            let a = build_step_node(&definition, &step, vec![0], &parent);
            let b = build_step_node(&definition, &step, vec![0], &parent);
            let ids = |n: &TestNode| n.descendants().iter().map(|d| d.id.clone()).collect::<Vec<_>>();
            prop_assert_eq!(ids(&a), ids(&b));
        }
    }
}
