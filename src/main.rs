use anyhow::Result;
use clap::Parser;
use log::info;

mod cli;

use cli::{Cli, Commands};
use cli::commands::{apps_command, match_command, navigate_command};
use microhost::config::HostConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("microhost.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    info!("Starting microhost");

    let config_path = match cli.config {
        Some(path) => path,
        None => HostConfig::default_path()?,
    };
    let config = HostConfig::load(&config_path)?;

    match cli.command {
        Commands::Apps => apps_command(&config),
        Commands::Match { path } => match_command(&config, &path),
        Commands::Navigate { paths, coexist } => navigate_command(&config, paths, coexist).await,
    }
}
