//! Discovery selectors and post-discovery filters

use std::fmt;

use crate::common::{Error, Result};
use crate::model::ScenarioDefinition;

/// What a discovery request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every class whose fully-qualified name lives under this package.
    /// The empty package selects everything.
    Package(String),
    /// One class by fully-qualified name
    Class(String),
    /// One producer of one class
    Method { class: String, method: String },
}

impl Selector {
    /// Parse `a.b.Class#method`
    pub fn parse_method(s: &str) -> Result<Self> {
        match s.split_once('#') {
            Some((class, method)) if !class.is_empty() && !method.is_empty() => {
                Ok(Selector::Method {
                    class: class.to_string(),
                    method: method.to_string(),
                })
            }
            _ => Err(Error::Config(format!(
                "Invalid method selector '{}', expected <class>#<method>",
                s
            ))),
        }
    }

    /// Select everything in the catalog
    pub fn all() -> Self {
        Selector::Package(String::new())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Package(p) if p.is_empty() => write!(f, "package:<root>"),
            Selector::Package(p) => write!(f, "package:{}", p),
            Selector::Class(c) => write!(f, "class:{}", c),
            Selector::Method { class, method } => write!(f, "method:{}#{}", class, method),
        }
    }
}

/// Tag-based pruning applied after discovery
///
/// A scenario is kept when it carries at least one included tag (or no
/// include list is given) and none of the excluded tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TagFilter {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn accepts(&self, scenario: &ScenarioDefinition) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|t| scenario.has_tag(t));
        let excluded = self.exclude.iter().any(|t| scenario.has_tag(t));
        included && !excluded
    }
}
