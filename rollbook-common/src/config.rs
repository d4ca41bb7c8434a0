//! Configuration file loading and data directory resolution
//!
//! Values resolve in priority order:
//! 1. Command-line argument (highest, including its env fallback)
//! 2. TOML config file
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of `config.toml`. All fields optional; missing fields fall
/// through to the next resolution tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    pub database: Option<String>,
    /// Bind address for the HTTP server (e.g. "127.0.0.1:5800")
    pub bind: Option<String>,
    /// Credential for the chat-completions service
    pub groq_api_key: Option<String>,
}

/// Load the TOML config from the first existing platform location,
/// or defaults when no file exists.
pub fn load_toml_config() -> Result<TomlConfig> {
    let Some(path) = config_file_path() else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Candidate configuration file path for the platform.
///
/// Linux: `~/.config/rollbook/config.toml`, falling back to
/// `/etc/rollbook/config.toml` when the user file is absent.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rollbook").join("config.toml"));

    if cfg!(target_os = "linux") {
        if let Some(path) = &user_config {
            if path.exists() {
                return user_config;
            }
        }
        let system_config = PathBuf::from("/etc/rollbook/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    user_config
}

/// OS-dependent default data directory (holds rollbook.db)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollbook"))
        .unwrap_or_else(|| PathBuf::from("./rollbook_data"))
}

/// Default database path inside a data directory
pub fn database_path_in(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("rollbook.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_all_none() {
        let config = TomlConfig::default();
        assert!(config.database.is_none());
        assert!(config.bind.is_none());
        assert!(config.groq_api_key.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let config: TomlConfig =
            toml::from_str("bind = \"0.0.0.0:5800\"").expect("partial config should parse");
        assert_eq!(config.bind.as_deref(), Some("0.0.0.0:5800"));
        assert!(config.database.is_none());
    }

    #[test]
    fn database_path_joins_data_dir() {
        let path = database_path_in(std::path::Path::new("/tmp/rb"));
        assert_eq!(path, PathBuf::from("/tmp/rb/rollbook.db"));
    }
}
