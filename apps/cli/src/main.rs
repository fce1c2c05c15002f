//! Curricula CLI: concept harmonization and course-graph sync.
//!
//! Consolidates concept mentions from many business units into canonical
//! concepts, and keeps the course graph in step with the object store.

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
