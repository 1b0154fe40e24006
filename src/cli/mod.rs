//! CLI command handling
//!
//! Dispatches CLI commands to discovery, the engine and the launcher, and
//! formats their output.

pub mod listener;

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde_json::{json, Value};

use crate::backend::{EnvironmentDirectory, ExecutionBackend, HttpBackend, ScriptedBackend};
use crate::commands::{Commands, SelectionArgs};
use crate::common::config::Config;
use crate::common::{DiscoveryIssue, Error, Result};
use crate::discovery::{
    loader, DiscoveryEngine, DiscoveryRequest, NodeKind, ProducerOutput, Selector, TagFilter, TestNode,
};
use crate::engine::{ChutneyEngine, EngineSettings, ExecutionRequest, TestEngine};
use crate::launcher::Launcher;
use crate::model::{Environment, ScenarioDefinition};
use crate::report::ReportWriter;

use listener::ConsoleListener;

/// Environment used by dry runs when none is defined
const DRY_RUN_ENVIRONMENT: &str = "LOCAL";

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;

    match command {
        Commands::Discover { dir, selection, json } => {
            let catalog = loader::load_dir(&dir)?;
            let engine = DiscoveryEngine::new(Arc::new(catalog), config.engine.step_as_test);
            let outcome = engine.discover(&discovery_request(&selection)?);

            if json {
                let output = json!({
                    "root": node_json(&outcome.root),
                    "issues": outcome.issues.iter().map(issue_json).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_tree(&outcome.root, 0);
                print_issues(&outcome.issues);
                println!(
                    "\n{} scenario(s) in {} class(es)",
                    outcome.root.scenario_count(),
                    outcome.root.children.len()
                );
            }
            Ok(())
        }

        Commands::Run {
            dir,
            selection,
            backend_url,
            dry_run,
            concurrency,
        } => {
            if let Some(url) = backend_url {
                config.backend.url = url;
            }
            if let Some(concurrency) = concurrency {
                if concurrency == 0 {
                    return Err(Error::Config("--concurrency must be at least 1".to_string()));
                }
                config.engine.concurrency = concurrency;
            }

            let catalog = loader::load_dir(&dir)?;
            let backend = backend(&config, dry_run)?;
            let engine = ChutneyEngine::new(Arc::new(catalog), backend, EngineSettings::from_config(&config));

            let outcome = engine.discover(&discovery_request(&selection)?);
            print_issues(&outcome.issues);
            if outcome.root.scenario_count() == 0 {
                println!("No scenarios found in {}", dir.display());
                return Ok(());
            }

            let listener = Arc::new(ConsoleListener::new(verbose));
            engine
                .execute(ExecutionRequest::new(Arc::new(outcome.root), listener.clone()))
                .await;

            let (failed, total) = listener.summary();
            if failed == 0 {
                println!("\n{} {} scenario(s) passed", "✓".green().bold(), total);
                Ok(())
            } else {
                println!("\n{} {} of {} scenario(s) failed", "✗".red().bold(), failed, total);
                Err(Error::ScenariosFailed { failed, total })
            }
        }

        Commands::Launch {
            file,
            env,
            expect,
            backend_url,
            dry_run,
        } => {
            if let Some(url) = backend_url {
                config.backend.url = url;
            }
            let scenarios = scenarios_of(&file)?;
            let launcher = Launcher::new(backend(&config, dry_run)?)
                .with_writer(ReportWriter::new(&config.paths.report_root));

            let summary = launcher.run(&scenarios, env.as_deref(), expect).await?;
            println!(
                "\n{} of {} scenario(s) ended {} on {}",
                summary.outcomes.len() - summary.mismatched(),
                summary.outcomes.len(),
                summary.expected,
                summary.environment
            );
            summary.ensure_expected()
        }

        Commands::Environments => {
            let directory = EnvironmentDirectory::new(&config.paths.environment_root);
            let environments = directory.list()?;
            if environments.is_empty() {
                println!("No environments in {}", directory.root().display());
                return Ok(());
            }

            for environment in &environments {
                print_environment(environment);
            }
            match directory.default_name() {
                Ok(name) => println!("\nDefault: {}", name.bold()),
                Err(e) => println!("\nDefault: {}", e.to_string().dimmed()),
            }
            Ok(())
        }
    }
}

fn discovery_request(selection: &SelectionArgs) -> Result<DiscoveryRequest> {
    let mut selectors: Vec<Selector> = selection
        .package
        .iter()
        .map(|p| Selector::Package(p.clone()))
        .chain(selection.class.iter().map(|c| Selector::Class(c.clone())))
        .collect();
    for method in &selection.method {
        selectors.push(Selector::parse_method(method)?);
    }
    if selectors.is_empty() {
        selectors.push(Selector::all());
    }

    Ok(DiscoveryRequest::new(selectors).with_tags(TagFilter {
        include: selection.tag.clone(),
        exclude: selection.exclude_tag.clone(),
    }))
}

fn backend(config: &Config, dry_run: bool) -> Result<Arc<dyn ExecutionBackend>> {
    let directory = EnvironmentDirectory::new(&config.paths.environment_root);
    if dry_run {
        let mut environments = directory.list()?;
        if environments.is_empty() {
            environments.push(Environment::new(DRY_RUN_ENVIRONMENT));
        }
        tracing::info!("Dry run: scenarios are replayed as successful");
        return Ok(Arc::new(ScriptedBackend::new().with_environments(environments)));
    }
    Ok(Arc::new(HttpBackend::from_config(&config.backend, directory)))
}

/// Every scenario produced by one file, in declaration order
fn scenarios_of(file: &Path) -> Result<Vec<ScenarioDefinition>> {
    let mut scenarios = Vec::new();
    for producer in loader::load_file(file)? {
        match producer.produce() {
            ProducerOutput::Single(scenario) => scenarios.push(scenario),
            ProducerOutput::Many(many) => scenarios.extend(many),
            ProducerOutput::Unsupported { type_name } => {
                tracing::warn!(producer = %producer.name, "Skipping producer returning {}", type_name);
            }
        }
    }
    Ok(scenarios)
}

fn print_tree(node: &TestNode, depth: usize) {
    let marker = match node.kind {
        NodeKind::Container => "+",
        NodeKind::Test => "-",
        NodeKind::ContainerAndTest => "*",
    };
    let retry = if node.retryable { " (retry)".yellow().to_string() } else { String::new() };
    let environment = node
        .scenario()
        .and_then(|s| s.environment.as_deref())
        .map(|e| format!(" [{}]", e).dimmed().to_string())
        .unwrap_or_default();
    println!("{}{} {}{}{}", "  ".repeat(depth), marker, node.display_name, environment, retry);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn print_issues(issues: &[DiscoveryIssue]) {
    for issue in issues {
        println!("{} {}", "!".yellow().bold(), issue);
    }
}

fn print_environment(environment: &Environment) {
    println!("{}", environment.name.bold());
    if !environment.description.is_empty() {
        println!("  {}", environment.description.dimmed());
    }
    for target in &environment.targets {
        println!("  {} {}", target.name, target.url.dimmed());
    }
}

fn node_json(node: &TestNode) -> Value {
    let mut value = json!({
        "id": node.id,
        "name": node.display_name,
        "kind": node.kind,
        "retryable": node.retryable,
        "children": node.children.iter().map(node_json).collect::<Vec<_>>(),
    });
    if let Some(environment) = node.scenario().and_then(|s| s.environment.as_deref()) {
        value["environment"] = json!(environment);
    }
    value
}

fn issue_json(issue: &DiscoveryIssue) -> Value {
    json!({
        "selector": issue.selector,
        "source": issue.source,
        "message": issue.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_selects_everything() {
        let request = discovery_request(&SelectionArgs::default()).unwrap();
        assert_eq!(request.selectors, vec![Selector::all()]);
        assert!(request.tags.is_empty());
    }

    #[test]
    fn test_selection_order_and_method_parsing() {
        let selection = SelectionArgs {
            package: vec!["web".to_string()],
            class: vec!["api.users".to_string()],
            method: vec!["api.users#create".to_string()],
            tag: vec!["smoke".to_string()],
            exclude_tag: vec![],
        };
        let request = discovery_request(&selection).unwrap();
        assert_eq!(request.selectors.len(), 3);
        assert_eq!(request.selectors[2].to_string(), "method:api.users#create");
        assert_eq!(request.tags.include, ["smoke"]);

        let bad = SelectionArgs {
            method: vec!["nohash".to_string()],
            ..SelectionArgs::default()
        };
        assert!(discovery_request(&bad).is_err());
    }

    #[test]
    fn test_node_json_shape() {
        let root = crate::discovery::descriptor::build_engine_node(Vec::new());
        let value = node_json(&root);
        assert_eq!(value["id"], "[engine:chutney]");
        assert_eq!(value["kind"], "CONTAINER");
        assert!(value.get("environment").is_none());
    }
}
