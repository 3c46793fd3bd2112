// ABOUTME: Entry point for the upshift CLI application.
// ABOUTME: Parses arguments, installs logging and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tracing_subscriber::EnvFilter;
use upshift::config::{self, Config};
use upshift::error::Result;
use upshift::output::Output;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = cli.output_mode();
    let result = run(cli, Output::new(mode)).await;

    if let Err(e) = result {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;

    if let Commands::Init { force } = cli.command {
        let path = config::init_config(&cwd, force)?;
        output.success(&format!("Created {}", path.display()));
        return Ok(());
    }

    let config = Config::resolve(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Upgrade {
            container,
            image,
            new_container_name,
            order,
            detach,
        } => {
            let args = commands::UpgradeArgs {
                container,
                image,
                new_container_name,
                order,
                detach,
            };
            commands::upgrade(config, args, output).await
        }
        Commands::Status { token, offset } => commands::status(config, &token, offset, output).await,
        Commands::SelfUpdate { once } => commands::self_update(config, once, output).await,
    }
}
