//! postforge CLI: research-backed LinkedIn post generator.
//!
//! Finds trending topics in a professional field, researches them with
//! search-grounded generation, and drafts several posts in distinct styles.

mod commands;
mod server;

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
