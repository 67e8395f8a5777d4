//! LinkScout CLI — pick the links on a scraped page that matter for a task.
//!
//! Reads a pipeline state file, asks a text-generation bridge which links
//! are relevant, and writes the state back with `relevant_links` filled in.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
