use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use apicov::app::App;
use apicov::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "apicov=info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Some(cmd) => {
            let mut app = App::new()?;
            app.run_command(cmd).await?;
        }
        None => {
            // Default to showing help when no command is specified
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
