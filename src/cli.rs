// src/cli.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "farmguard-gateway",
    version,
    about = "Credential rotation and resilience gateway for FarmGuard external APIs",
    long_about = "Keeps a pool of API keys per external service, blacklists keys that fail, \
                  and serves key diagnostics and admin operations over HTTP."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "FARMGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server bind address (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log filter directive
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log in plain text instead of JSON
    #[arg(long)]
    pub no_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Validate the configuration and print a summary
    Config {
        /// Also list every service's key count and probe URL
        #[arg(short, long)]
        verbose: bool,
    },

    /// Key management commands
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeyCommands {
    /// Print the status of every service's keys as JSON
    Status,

    /// Probe every key against its provider
    Validate,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }

    /// Apply `--host`/`--port` on top of a loaded configuration and validate
    /// the result again.
    pub fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        ConfigValidator::validate(config)
    }
}
