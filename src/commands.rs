//! CLI command definitions
//!
//! Defines the clap commands for the `chutney` binary.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::model::Status;

#[derive(Subcommand)]
pub enum Commands {
    /// Discover scenarios and print the test tree
    Discover {
        /// Directory of scenario files
        dir: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Print the tree and issues as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discover then execute scenarios
    Run {
        /// Directory of scenario files
        dir: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Execution backend URL (overrides configuration)
        #[arg(long)]
        backend_url: Option<String>,

        /// Replay every scenario as successful without a backend
        #[arg(long)]
        dry_run: bool,

        /// Scenarios allowed to run at once per class (overrides configuration)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run every scenario of one file and check their final status
    Launch {
        /// Scenario file
        file: PathBuf,

        /// Environment to run on (default: the only defined one)
        #[arg(long)]
        env: Option<String>,

        /// Status every scenario is expected to end with
        #[arg(long, default_value = "SUCCESS", value_parser = parse_status)]
        expect: Status,

        /// Execution backend URL (overrides configuration)
        #[arg(long)]
        backend_url: Option<String>,

        /// Replay every scenario as successful without a backend
        #[arg(long)]
        dry_run: bool,
    },

    /// List environments and the default one
    Environments,
}

/// Discovery selectors and tag filters
#[derive(Args, Debug, Default, Clone)]
pub struct SelectionArgs {
    /// Select classes under a package (repeatable)
    #[arg(long)]
    pub package: Vec<String>,

    /// Select a class by fully-qualified name (repeatable)
    #[arg(long)]
    pub class: Vec<String>,

    /// Select one producer: <class>#<method> (repeatable)
    #[arg(long)]
    pub method: Vec<String>,

    /// Keep only scenarios with one of these tags
    #[arg(long)]
    pub tag: Vec<String>,

    /// Drop scenarios with any of these tags
    #[arg(long)]
    pub exclude_tag: Vec<String>,
}

fn parse_status(s: &str) -> Result<Status, String> {
    s.parse()
}
