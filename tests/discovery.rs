//! Discovery tests over the scenario files in `tests/fixtures/scenarios`

use std::path::PathBuf;
use std::sync::Arc;

use chutney::backend::ScriptedBackend;
use chutney::discovery::{loader, DiscoveryEngine, DiscoveryRequest, NodeKind, Selector, TagFilter, TestNode};
use chutney::model::Environment;
use chutney::{ChutneyEngine, EngineSettings, ExecutionListener, ExecutionRequest, TestEngine, TestResult};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenarios")
}

fn engine(step_as_test: bool) -> DiscoveryEngine {
    let catalog = loader::load_dir(&fixtures()).expect("fixtures load");
    DiscoveryEngine::new(Arc::new(catalog), step_as_test)
}

fn scenario_ids(root: &TestNode) -> Vec<String> {
    root.descendants()
        .into_iter()
        .filter(|n| n.is_scenario())
        .map(|n| n.id.to_string())
        .collect()
}

#[test]
fn test_directory_becomes_classes_in_path_order() {
    let catalog = loader::load_dir(&fixtures()).unwrap();
    let names: Vec<&str> = catalog.classes().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["api.broken", "api.users", "web.search"]);
    assert!(catalog.class("api.broken").unwrap().load_error.is_some());
}

#[test]
fn test_discover_everything_reports_issues_without_hiding_the_rest() {
    let outcome = engine(false).discover(&DiscoveryRequest::all());

    assert_eq!(
        scenario_ids(&outcome.root),
        [
            "[engine:chutney]/[class:api.users]/[scenario:create]",
            "[engine:chutney]/[class:web.search]/[scenario:byTitle]",
            "[engine:chutney]/[class:web.search]/[scenario:allLanguages#1]",
            "[engine:chutney]/[class:web.search]/[scenario:allLanguages#2]",
        ]
    );

    let sources: Vec<&str> = outcome.issues.iter().map(|i| i.source.as_str()).collect();
    assert_eq!(sources, ["api.broken", "web.search#nothing"]);
    assert!(outcome.issues[1].message.contains("number"));

    let search = &outcome.root.children[1];
    assert_eq!(search.display_name, "search");
    assert_eq!(search.kind, NodeKind::Container);
    assert!(search.children.iter().all(|s| s.kind == NodeKind::Test && s.children.is_empty()));
    assert_eq!(
        search.children[0].scenario().unwrap().environment.as_deref(),
        Some("DEV")
    );
}

#[test]
fn test_steps_as_tests_mirror_scenario_structure() {
    let outcome = engine(true).discover(&DiscoveryRequest::new(vec![Selector::Class("web.search".to_string())]));
    let by_title = &outcome.root.children[0].children[0];

    assert_eq!(by_title.display_name, "Search by title");
    assert_eq!(by_title.kind, NodeKind::ContainerAndTest);

    let steps: Vec<(&str, NodeKind, bool)> = by_title
        .children
        .iter()
        .map(|s| (s.display_name.as_str(), s.kind, s.retryable))
        .collect();
    assert_eq!(
        steps,
        [
            ("open the home page", NodeKind::Test, false),
            ("search for a title", NodeKind::Test, false),
            ("results are shown", NodeKind::Container, true),
        ]
    );

    let wait = &by_title.children[2].children[0];
    assert_eq!(
        wait.id.to_string(),
        "[engine:chutney]/[class:web.search]/[scenario:byTitle]/[step:2]/[step:0]"
    );
    assert!(!wait.retryable);
}

#[test]
fn test_tag_filter_keeps_positional_segments() {
    let request = DiscoveryRequest::all().with_tags(TagFilter {
        include: vec![],
        exclude: vec!["i18n".to_string()],
    });
    let outcome = engine(false).discover(&request);
    assert!(scenario_ids(&outcome.root)
        .contains(&"[engine:chutney]/[class:web.search]/[scenario:allLanguages#2]".to_string()));
    assert!(!scenario_ids(&outcome.root).iter().any(|id| id.ends_with("#1]")));

    let smoke = engine(false).discover(&DiscoveryRequest::all().with_tags(TagFilter {
        include: vec!["smoke".to_string()],
        exclude: vec![],
    }));
    assert_eq!(smoke.root.scenario_count(), 2);
}

#[test]
fn test_method_selectors_pick_producers() {
    let outcome = engine(false).discover(&DiscoveryRequest::new(vec![
        Selector::parse_method("web.search#allLanguages").unwrap(),
        Selector::parse_method("web.search#missing").unwrap(),
        Selector::Class("web.nowhere".to_string()),
    ]));

    assert_eq!(outcome.root.scenario_count(), 2);
    assert_eq!(outcome.issues.len(), 2);
    assert_eq!(outcome.issues[0].source, "web.search#missing");
    assert_eq!(outcome.issues[1].message, "class not found");
}

#[test]
fn test_package_selector_limits_classes() {
    let outcome = engine(false).discover(&DiscoveryRequest::new(vec![Selector::Package("api".to_string())]));
    let classes: Vec<&str> = outcome.root.children.iter().map(|c| c.display_name.as_str()).collect();
    assert_eq!(classes, ["users"]);
    assert_eq!(outcome.issues.len(), 1);
}

#[test]
fn test_missing_directory_is_an_error() {
    assert!(loader::load_dir(&fixtures().join("nope")).is_err());
}

struct Silent;

impl ExecutionListener for Silent {
    fn execution_started(&self, _node: &TestNode) {}
    fn execution_finished(&self, _node: &TestNode, _result: &TestResult) {}
}

#[tokio::test]
async fn test_discovered_files_run_end_to_end() {
    let catalog = loader::load_dir(&fixtures()).unwrap();
    let backend = Arc::new(ScriptedBackend::new().with_environment(Environment::new("DEV")));
    let engine = ChutneyEngine::new(Arc::new(catalog), backend.clone(), EngineSettings::default());

    let outcome = engine.discover(&DiscoveryRequest::all());
    engine
        .execute(ExecutionRequest::new(Arc::new(outcome.root), Arc::new(Silent)))
        .await;

    let mut submitted: Vec<String> = backend.submissions().into_iter().map(|s| s.scenario).collect();
    submitted.sort();
    assert_eq!(
        submitted,
        ["Create a user", "Search by title", "Search in english", "Search in french"]
    );
    assert!(backend.submissions().iter().all(|s| s.environment == "DEV"));
}
