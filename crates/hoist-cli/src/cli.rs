use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hoist", about = "Hoist storage layer: provisioning, health and configuration", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision storage and read back the health sentinels
    Health,
    /// Print the configuration resolved from the environment
    Config,
    /// Run an account, app, deployment, and release through storage
    Selftest,
}
