//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer requests with "response: <request>" until interrupted
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Send one request and print the reply
    Request {
        /// Request payload
        #[arg(long, value_name = "TEXT")]
        message: String,

        /// Server port (overrides configuration)
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,

        /// Give up if no reply arrives within this many seconds
        #[arg(long, value_name = "SECONDS", default_value = "10")]
        timeout: u64,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path (prints to stdout when omitted)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
