//! Configuration resolution for rollbook-api
//!
//! Each value resolves CLI/env (clap handles the env fallback) → TOML
//! config file → compiled default. The chat credential is optional and
//! its absence degrades the chat feature only.

use clap::Parser;
use rollbook_common::config::{self, TomlConfig};
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_BIND: &str = "127.0.0.1:5800";

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "rollbook-api", about = "School attendance service", version)]
pub struct Args {
    /// Path to the SQLite database file
    #[arg(long, env = "ROLLBOOK_DATABASE")]
    pub database: Option<PathBuf>,

    /// Bind address for the HTTP server
    #[arg(long, env = "ROLLBOOK_BIND")]
    pub bind: Option<String>,

    /// Credential for the chat-completions service
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub bind: String,
    pub groq_api_key: Option<String>,
}

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

impl Config {
    /// Merge CLI/env arguments with the TOML config
    pub fn resolve(args: Args, toml_config: &TomlConfig) -> Self {
        let database_path = args
            .database
            .or_else(|| toml_config.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| config::database_path_in(&config::default_data_dir()));

        let bind = args
            .bind
            .or_else(|| toml_config.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let cli_key = args.groq_api_key.filter(|k| is_valid_key(k));
        let toml_key = toml_config.groq_api_key.clone().filter(|k| is_valid_key(k));

        if cli_key.is_some() && toml_key.is_some() {
            warn!("Chat credential found in multiple sources; using CLI/environment value");
        }

        let groq_api_key = match (cli_key, toml_key) {
            (Some(key), _) => {
                info!("Chat credential loaded from CLI/environment");
                Some(key)
            }
            (None, Some(key)) => {
                info!("Chat credential loaded from TOML config");
                Some(key)
            }
            (None, None) => None,
        };

        Self {
            database_path,
            bind,
            groq_api_key,
        }
    }
}
