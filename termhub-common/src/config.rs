//! Configuration loading and data directory resolution
//!
//! Resolution priority for every setting: command line → environment →
//! TOML config file → compiled default. The TOML file lives at
//! `~/.config/termhub/termhub.toml` (or `/etc/termhub/termhub.toml`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory holding the database and scratch files
    pub data_dir: Option<String>,
    /// API key for the enrichment service
    pub enrichment_api_key: Option<String>,
    /// Base URL for the enrichment service (OpenAI-compatible)
    pub enrichment_base_url: Option<String>,
    /// Model identifier sent with enrichment requests
    pub enrichment_model: Option<String>,
    /// Listen address for the HTTP surface (e.g. "127.0.0.1:5810")
    pub listen_addr: Option<String>,
    /// Pipeline tunables, deserialized by the ingest service
    pub ingest: Option<toml::Value>,
}

/// Get default configuration file path for the platform
fn config_file_path() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        // Prefer ~/.config/termhub/termhub.toml, fall back to /etc
        let user_config = dirs::config_dir().map(|d| d.join("termhub").join("termhub.toml"));
        if let Some(path) = &user_config {
            if path.exists() {
                return user_config;
            }
        }
        let system_config = PathBuf::from("/etc/termhub/termhub.toml");
        if system_config.exists() {
            return Some(system_config);
        }
        user_config
    } else {
        dirs::config_dir().map(|d| d.join("termhub").join("termhub.toml"))
    }
}

/// Load the TOML configuration file, returning defaults if absent
pub fn load_toml_config() -> TomlConfig {
    let Some(path) = config_file_path() else {
        return TomlConfig::default();
    };
    load_toml_config_from(&path)
}

/// Load a TOML configuration file from an explicit path
pub fn load_toml_config_from(path: &Path) -> TomlConfig {
    if !path.exists() {
        return TomlConfig::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse {}: {} (using defaults)", path.display(), e);
                TomlConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {} (using defaults)", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write the TOML configuration atomically (write temp file, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Resolve the data directory.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `TERMHUB_DATA_DIR` environment variable
/// 3. TOML config file
/// 4. Platform default (`~/.local/share/termhub`)
pub fn resolve_data_dir(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("TERMHUB_DATA_DIR") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = &toml_config.data_dir {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::data_dir()
        .map(|d| d.join("termhub"))
        .unwrap_or_else(|| PathBuf::from("./termhub-data"))
}

/// Ensure the data directory exists and return the database path inside it
pub fn ensure_data_dir(data_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("termhub.db"))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the enrichment API key from ENV → TOML.
///
/// Returns `None` (with a warning) when no key is configured; the ingest
/// service then runs with rule-based mapping only.
pub fn resolve_enrichment_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var("TERMHUB_ENRICHMENT_API_KEY").ok();
    let toml_key = toml_config.enrichment_api_key.clone();

    let mut sources = Vec::new();
    if env_key.as_deref().map(is_valid_key).unwrap_or(false) {
        sources.push("environment");
    }
    if toml_key.as_deref().map(is_valid_key).unwrap_or(false) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "Enrichment API key found in multiple sources: {}. Using environment (highest priority).",
            sources.join(", ")
        );
    }

    if let Some(key) = env_key {
        if is_valid_key(&key) {
            info!("Enrichment API key loaded from environment variable");
            return Some(key);
        }
    }
    if let Some(key) = toml_key {
        if is_valid_key(&key) {
            info!("Enrichment API key loaded from TOML config");
            return Some(key);
        }
    }

    warn!(
        "Enrichment API key not configured. Free-text fields will be mapped with rules only.\n\
         Configure using one of:\n\
         1. Environment: TERMHUB_ENRICHMENT_API_KEY=your-key-here\n\
         2. TOML config: ~/.config/termhub/termhub.toml (enrichment_api_key = \"your-key\")"
    );
    None
}
