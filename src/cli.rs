// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments and the global output flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upshift::output::OutputMode;
use upshift::types::ImageRef;
use upshift::upgrade::ReplacementOrder;

#[derive(Parser)]
#[command(name = "upshift")]
#[command(about = "In-place container upgrades with volume backup and self-update")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (default: upshift.yml in the current directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template upshift.yml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Upgrade a managed container
    Upgrade {
        /// Container id or name (default: the running managed container)
        container: Option<String>,

        /// Image to upgrade to
        #[arg(long)]
        image: Option<ImageRef>,

        /// Name for the replacement container
        #[arg(long)]
        new_container_name: Option<String>,

        /// stop-then-start or start-then-stop
        #[arg(long)]
        order: Option<ReplacementOrder>,

        /// Print the job token and wait without streaming the log
        #[arg(short, long)]
        detach: bool,
    },

    /// Poll the log of an upgrade job once
    Status {
        /// Job token printed by `upgrade`
        token: String,

        /// Byte offset returned by the previous poll
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Replace this process's container when a newer image is available
    SelfUpdate {
        /// Run one check instead of the scheduler loop
        #[arg(long)]
        once: bool,
    },
}
