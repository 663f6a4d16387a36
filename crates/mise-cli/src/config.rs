//! Configuration file management for mise.
//!
//! Provides a TOML-based config file at `~/.config/mise/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mise_core::publish::Topics;
use mise_db::config::{DATABASE_URL_ENV, DbConfig};

/// Overrides the topic data change events go to.
pub const DATA_CHANGES_TOPIC_ENV: &str = "DATA_CHANGES_TOPIC_NAME";
/// Overrides the topic re-index requests go to.
pub const SEARCH_INDEXING_TOPIC_ENV: &str = "SEARCH_INDEXING_TOPIC_NAME";
/// When `true`, worker commands exit immediately.
pub const CEASE_OPERATION_ENV: &str = "CEASE_OPERATION";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub topics: TopicsSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TopicsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_changes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_indexing: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mise config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mise` or `~/.config/mise`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mise");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mise")
}

/// Return the path to the mise config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MiseConfig {
    pub db_config: DbConfig,
    pub topics: Topics,
}

impl MiseConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `MISE_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Topics: `DATA_CHANGES_TOPIC_NAME` / `SEARCH_INDEXING_TOPIC_NAME` > `topics.*` > defaults
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Some(url) = env_value(DATABASE_URL_ENV) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let file_topics = file_config.map(|cfg| cfg.topics).unwrap_or_default();
        let defaults = Topics::default();
        let topics = Topics {
            data_changes: env_value(DATA_CHANGES_TOPIC_ENV)
                .or(file_topics.data_changes)
                .unwrap_or(defaults.data_changes),
            search_indexing: env_value(SEARCH_INDEXING_TOPIC_ENV)
                .or(file_topics.search_indexing)
                .unwrap_or(defaults.search_indexing),
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            topics,
        })
    }
}

/// A non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// True if `CEASE_OPERATION` is set to `true`, in any case.
pub fn cease_operation() -> bool {
    std::env::var(CEASE_OPERATION_ENV).is_ok_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
