use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "microhost")]
#[command(about = "Host shell for micro-frontend sub-applications")]
pub struct Cli {
    /// Host configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered applications
    Apps,
    /// Show which application a path selects
    Match {
        /// Path to resolve
        path: String,
    },
    /// Run the shell and navigate through the given paths in order
    Navigate {
        /// Paths to visit
        #[arg(required = true)]
        paths: Vec<String>,
        /// Keep previous applications alive, hidden, instead of destroying them
        #[arg(long)]
        coexist: bool,
    },
}
