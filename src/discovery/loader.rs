//! Scenario files as discovery sources
//!
//! Each `.yaml`, `.yml` or `.json` file under a root directory is one
//! class-scope named after its relative path (`web/search.yaml` becomes
//! `web.search`). Its `producers` mapping declares the producers, in file
//! order:
//!
//! ```yaml
//! producers:
//!   byTitle:
//!     environment: DEV
//!     produces: { title: ..., when: ... }
//!   allLanguages:
//!     produces:
//!       - { title: ..., when: ... }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::common::{Error, Result};
use crate::model::ScenarioDefinition;

use super::catalog::{ClassSource, Producer, ProducerOutput, ScenarioCatalog};

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Build a catalog from every scenario file below `root`
///
/// Files that cannot be parsed still appear, as broken classes, so that
/// discovery reports them without hiding the rest.
pub fn load_dir(root: &Path) -> Result<ScenarioCatalog> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "Scenario directory '{}' does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut catalog = ScenarioCatalog::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();
    for file in files {
        let name = class_name(root, &file);
        if let Some(first) = origins.get(&name) {
            let relative = file.strip_prefix(root).unwrap_or(&file).display().to_string();
            tracing::warn!(file = %file.display(), class = %name, "Duplicate class name");
            catalog.add(ClassSource::broken(
                relative,
                format!(
                    "duplicate class name '{}', already defined by {}",
                    name,
                    first.strip_prefix(root).unwrap_or(first).display()
                ),
            ));
            continue;
        }
        origins.insert(name.clone(), file.clone());

        let class = match load_file(&file) {
            Ok(producers) => {
                let mut class = ClassSource::new(name);
                class.producers = producers;
                class
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Unreadable scenario file");
                ClassSource::broken(name, e.to_string())
            }
        };
        catalog.add(class);
    }

    tracing::debug!(root = %root.display(), classes = catalog.classes().len(), "Loaded scenario catalog");
    Ok(catalog)
}

/// Parse the producers of one scenario file
pub fn load_file(path: &Path) -> Result<Vec<Producer>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    parse_producers(&content).map_err(|e| Error::ScenarioParse {
        path: path.display().to_string(),
        error: e,
    })
}

/// Parse the `producers` mapping of a scenario document
pub fn parse_producers(content: &str) -> std::result::Result<Vec<Producer>, String> {
    let document: Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

    let producers = match document.get("producers") {
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err("'producers' must be a mapping".to_string()),
        None => return Err("missing 'producers' section".to_string()),
    };

    let mut result = Vec::with_capacity(producers.len());
    for (key, entry) in producers {
        let name = match key {
            Value::String(s) => s.clone(),
            other => return Err(format!("producer name must be a string, got {}", type_name(other))),
        };

        let environment = entry
            .get("environment")
            .and_then(Value::as_str)
            .map(str::to_string);

        let output = match entry.get("produces") {
            Some(value) => interpret(value),
            None => ProducerOutput::Unsupported {
                type_name: "nothing ('produces' is missing)".to_string(),
            },
        };

        let mut producer = Producer::new(name, move || output.clone());
        producer.environment = environment;
        result.push(producer);
    }
    Ok(result)
}

/// Read a produced value as one scenario or an ordered list of them
fn interpret(value: &Value) -> ProducerOutput {
    match value {
        Value::Mapping(_) => match serde_yaml::from_value::<ScenarioDefinition>(value.clone()) {
            Ok(scenario) => ProducerOutput::Single(scenario),
            Err(e) => ProducerOutput::Unsupported {
                type_name: format!("mapping that is not a scenario ({})", e),
            },
        },
        Value::Sequence(items) => {
            let mut scenarios = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match serde_yaml::from_value::<ScenarioDefinition>(item.clone()) {
                    Ok(scenario) => scenarios.push(scenario),
                    Err(e) => {
                        return ProducerOutput::Unsupported {
                            type_name: format!("sequence whose item {} is not a scenario ({})", index, e),
                        }
                    }
                }
            }
            ProducerOutput::Many(scenarios)
        }
        other => ProducerOutput::Unsupported {
            type_name: type_name(other).to_string(),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// `root/a/b/c.yaml` → `a.b.c`
pub fn class_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
producers:
  single:
    environment: DEV
    produces:
      title: One
      when:
        description: do it
        implementation:
          type: debug
  several:
    produces:
      - title: Two
        when: { description: a }
      - title: Three
        when: { description: b }
  broken:
    produces: 42
"#;

    #[test]
    fn test_parse_producers_in_file_order() {
        let producers = parse_producers(DOC).unwrap();
        let names: Vec<&str> = producers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["single", "several", "broken"]);
        assert_eq!(producers[0].environment.as_deref(), Some("DEV"));
        assert!(producers[1].environment.is_none());

        assert!(matches!(producers[0].produce(), ProducerOutput::Single(ref s) if s.title == "One"));
        assert!(matches!(producers[1].produce(), ProducerOutput::Many(ref v) if v.len() == 2));
        assert!(matches!(
            producers[2].produce(),
            ProducerOutput::Unsupported { ref type_name } if type_name == "number"
        ));
    }

    #[test]
    fn test_sequence_with_non_scenario_is_unsupported() {
        let producers = parse_producers(
            r#"
producers:
  mixed:
    produces:
      - title: ok
        when: { description: a }
      - hello
"#,
        )
        .unwrap();
        match producers[0].produce() {
            ProducerOutput::Unsupported { type_name } => assert!(type_name.contains("item 1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_producers_section() {
        assert!(parse_producers("title: nope").is_err());
    }

    #[test]
    fn test_class_name_from_path() {
        let root = Path::new("/scenarios");
        assert_eq!(class_name(root, Path::new("/scenarios/web/search.yaml")), "web.search");
        assert_eq!(class_name(root, Path::new("/scenarios/api.json")), "api");
    }

    #[test]
    fn test_load_dir_keeps_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/search.yaml"), DOC).unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "producers: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = load_dir(dir.path()).unwrap();
        let names: Vec<&str> = catalog.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["bad", "web.search"]);
        assert!(catalog.class("bad").unwrap().load_error.is_some());
        assert_eq!(catalog.class("web.search").unwrap().producers.len(), 3);
    }

    #[test]
    fn test_colliding_class_names_surface_as_broken_classes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        let doc = |title: &str| format!("producers:\n  p:\n    produces:\n      title: {}\n      when: {{ description: a }}\n", title);
        std::fs::write(dir.path().join("web/search.yaml"), doc("FromYaml")).unwrap();
        std::fs::write(dir.path().join("web/search.yml"), doc("FromYml")).unwrap();
        std::fs::write(dir.path().join("web.search.json"), doc("FromJson")).unwrap();

        let catalog = load_dir(dir.path()).unwrap();
        let kept = catalog.class("web.search").unwrap();
        assert!(kept.load_error.is_none());
        assert!(matches!(kept.producers[0].produce(), ProducerOutput::Single(ref s) if s.title == "FromYaml"));

        let duplicates: Vec<&ClassSource> = catalog.classes().iter().filter(|c| c.load_error.is_some()).collect();
        assert_eq!(duplicates.len(), 2);
        for duplicate in &duplicates {
            let error = duplicate.load_error.as_deref().unwrap();
            assert!(error.contains("duplicate class name 'web.search'"), "{}", error);
        }

        let engine = super::super::DiscoveryEngine::new(std::sync::Arc::new(catalog), false);
        let outcome = engine.discover(&super::super::DiscoveryRequest::all());
        assert_eq!(outcome.root.scenario_count(), 1);
        assert_eq!(outcome.issues.len(), 2);
    }
}
