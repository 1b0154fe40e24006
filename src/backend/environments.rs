//! Environment descriptors read from a local directory
//!
//! Each `<root>/<NAME>.json` file holds one [`Environment`]. The directory
//! is read on every lookup so edits are picked up by long-lived engines.

use std::path::{Path, PathBuf};

use crate::common::paths::sanitize_file_name;
use crate::common::{EnvironmentError, Error, Result};
use crate::model::Environment;

#[derive(Debug, Clone)]
pub struct EnvironmentDirectory {
    root: PathBuf,
}

impl EnvironmentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every readable environment, sorted by name
    ///
    /// Unparseable files are logged and left out so that one broken
    /// descriptor does not hide the others.
    pub fn list(&self) -> Result<Vec<Environment>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut environments = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            match read_environment(&path) {
                Ok(environment) => environments.push(environment),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping environment file: {}", e),
            }
        }
        environments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(environments)
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|e| e.name).collect())
    }

    /// The only defined environment, if there is exactly one
    pub fn default_name(&self) -> Result<String> {
        let mut names = self.names()?;
        match names.len() {
            0 => Err(EnvironmentError::NoneDefined.into()),
            1 => Ok(names.remove(0)),
            _ => Err(EnvironmentError::Ambiguous { candidates: names }.into()),
        }
    }

    /// Read `<root>/<name>.json`, else any descriptor carrying `name`
    pub fn resolve(&self, name: &str) -> Result<Environment> {
        if sanitize_file_name(name) == name && !name.is_empty() {
            let path = self.root.join(format!("{}.json", name));
            if path.is_file() {
                let environment = read_environment(&path)?;
                if environment.name == name {
                    return Ok(environment);
                }
            }
        }

        self.list()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                EnvironmentError::NotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

fn read_environment(path: &Path) -> Result<Environment> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| {
        EnvironmentError::Invalid {
            path: path.display().to_string(),
            error: e.to_string(),
        }
        .into()
    })
}
