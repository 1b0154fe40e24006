//! Chutney scenario runner
//!
//! Discovers scenario files, runs them against an execution backend and
//! reports a verdict per scenario.

use chutney::cli;
use chutney::commands::Commands;
use chutney::common::logging;
use clap::Parser;

#[derive(Parser)]
#[command(name = "chutney", about = "Discover and run Chutney scenarios")]
#[command(version, long_about = None)]
struct Cli {
    /// Debug logging, and every step in run output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init_verbose();
    } else {
        logging::init_cli();
    }

    if let Err(e) = cli::dispatch(cli.command, cli.verbose).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
