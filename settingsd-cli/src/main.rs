use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "settingsd", about = "Session settings daemon with loadable plugins")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run(commands::run::RunArgs),
    #[command(flatten)]
    Plugin(commands::plugin::PluginCommands),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = config::ConfigLoader::load()?;

    match cli.command {
        Commands::Run(args) => commands::run::run(args, &config).await,
        Commands::Plugin(command) => commands::plugin::run(command, &config),
        Commands::Config(args) => commands::config::run(args, &config),
    }
}
