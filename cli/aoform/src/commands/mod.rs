//! CLI commands.

pub mod apply;
pub mod init;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// aoform - Deploy and update Lua processes on the AO network.
#[derive(Debug, Parser)]
#[command(name = "aoform")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log line format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy or update processes.
    Apply(apply::ApplyCommand),

    /// Initialize a new processes.yaml file.
    Init(init::InitCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        self.execute(Config::from_env).await
    }

    /// Run the command, loading configuration only if the command needs it.
    async fn execute(self, load_config: impl FnOnce() -> Result<Config>) -> Result<()> {
        match self.command {
            Commands::Apply(cmd) => {
                let ctx = CommandContext {
                    config: load_config()?,
                    format: self.format,
                };
                cmd.run(ctx).await
            }
            Commands::Init(cmd) => cmd.run(),
            Commands::Version => {
                println!("aoform {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}
