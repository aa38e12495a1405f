//! ResearchFlow CLI: research a topic and turn it into publishable content.
//!
//! Runs the research → retrieval → writing → SEO pipeline and prints the
//! normalized result, content outputs, and a quick view.

mod commands;
mod render;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // API keys may live in a local .env file.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
