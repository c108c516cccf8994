//! Read a forest, prompt for leaf values on stdin and print the root sums.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use foothread_core::{Config, Runtime};
use foothread_forest::{Forest, ReaderSource, compute_sums};

#[derive(Debug, Parser)]
#[command(name = "computesum")]
#[command(about = "Sum each tree of a forest with one foothread per node")]
struct Cli {
    /// Forest description: node count, then (index, parent) pairs.
    #[arg(long, default_value = "tree.txt")]
    tree: PathBuf,
    /// Also write the root sums as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let runtime = Arc::new(Runtime::new(Config::from_env()));

    #[cfg(unix)]
    foothread_forest::signals::install_shutdown_handler(Arc::clone(&runtime))?;

    let text = std::fs::read_to_string(&cli.tree)
        .map_err(|err| format!("cannot read {}: {err}", cli.tree.display()))?;
    let forest = Forest::parse(&text)?;

    let sums = compute_sums(&runtime, &forest, ReaderSource::stdin(), io::stdout())?;

    if let Some(path) = cli.json {
        std::fs::write(&path, serde_json::to_string_pretty(&sums)?)?;
    }
    Ok(())
}
