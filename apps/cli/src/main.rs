//! gobracket CLI: renders online-go tournament rounds to HTML.
//!
//! Round headers paint first; each round's groups and games are filled in
//! as their API calls complete, under a shared request budget.

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
