//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a small TOML file. Everything has a
//! built-in default, so a missing file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ACRED_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ACRED_ROOT_FOLDER";

/// Environment variable overriding the cache TTL (seconds)
pub const CACHE_TTL_ENV: &str = "ACRED_CACHE_TTL";

/// Environment variable overriding the database location
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Default cache TTL when neither ENV nor TOML provide one
pub const DEFAULT_CACHE_TTL_SECS: u64 = 120;

/// Default upper bound for summary page sizes
pub const DEFAULT_SUMMARY_PAGE_CAP: i64 = 50;

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "acred.db";

/// Bootstrap configuration loaded from TOML
///
/// Read once at startup; a restart is needed to pick up changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database, data and output directories
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Directory holding the source CSV/XLSX files (default: `<root>/data`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Directory receiving generated artifacts (default: `<root>/output`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Explicit database URL (only `sqlite:` URLs are supported)
    #[serde(default)]
    pub database_url: Option<String>,

    /// Result cache TTL in seconds (0 disables caching)
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    /// Maximum page size accepted by summary listings
    #[serde(default)]
    pub summary_page_cap: Option<i64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Accreditation rule set overrides
    #[serde(default)]
    pub rule_sets: Vec<RuleSetConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One `[[rule_sets]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuleSetConfig {
    pub accreditation_id: String,
    pub experience_window_years: u32,
    #[serde(default)]
    pub production_window_years: Option<u32>,
    pub min_production_count: usize,
    pub max_production_count: usize,
    #[serde(default = "default_version_tag")]
    pub version_tag: String,
}

fn default_version_tag() -> String {
    "custom".to_string()
}

/// Where the relational store lives
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseLocation {
    /// SQLite file created on demand
    File(PathBuf),
    /// Explicit connection URL
    Url(String),
}

impl TomlConfig {
    /// Load bootstrap configuration
    ///
    /// An explicit path must exist and parse. Without one, the platform
    /// config locations are searched; nothing found means built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_file() {
                Some(path) => path,
                None => {
                    warn!("No acred.toml found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Parse TOML failed for {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Source directory for bootstrap loads
    pub fn data_dir(&self, root: &Path) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| root.join("data"))
    }

    /// Destination directory for generated artifacts
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| root.join("output"))
    }

    /// Resolve the database location: ENV → TOML → `<root>/acred.db`
    pub fn database_location(&self, root: &Path) -> Result<DatabaseLocation> {
        let url = std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.database_url.clone());

        match url {
            Some(url) => {
                let url = url.trim().to_string();
                if !url.starts_with("sqlite:") {
                    return Err(Error::Config(format!(
                        "Unsupported database URL '{}': only sqlite: URLs are supported",
                        url
                    )));
                }
                Ok(DatabaseLocation::Url(url))
            }
            None => Ok(DatabaseLocation::File(root.join(DATABASE_FILE_NAME))),
        }
    }

    /// Resolve the cache TTL: ENV → TOML → default
    ///
    /// Negative ENV values clamp to zero (caching disabled).
    pub fn cache_ttl(&self) -> Duration {
        if let Ok(raw) = std::env::var(CACHE_TTL_ENV) {
            match raw.trim().parse::<i64>() {
                Ok(secs) => return Duration::from_secs(secs.max(0) as u64),
                Err(_) => warn!(
                    "Ignoring {}='{}' (not an integer), using default {}s",
                    CACHE_TTL_ENV, raw, DEFAULT_CACHE_TTL_SECS
                ),
            }
        }
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS))
    }

    /// Summary page cap, never below 1
    pub fn summary_page_cap(&self) -> i64 {
        self.summary_page_cap
            .unwrap_or(DEFAULT_SUMMARY_PAGE_CAP)
            .max(1)
    }
}

/// Resolve the root folder following the priority order above
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// First existing config file among the platform locations
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("acred").join("acred.toml"));
    let system_config = PathBuf::from("/etc/acred/acred.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|path| path.exists())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("acred"))
        .unwrap_or_else(|| PathBuf::from("./acred_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            root_folder = "/srv/acred"
            cache_ttl_secs = 30
            summary_page_cap = 20

            [logging]
            level = "debug"

            [[rule_sets]]
            accreditation_id = "AACSB"
            experience_window_years = 5
            min_production_count = 2
            max_production_count = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/acred")));
        assert_eq!(config.cache_ttl_secs, Some(30));
        assert_eq!(config.summary_page_cap(), 20);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.rule_sets.len(), 1);
        assert_eq!(config.rule_sets[0].version_tag, "custom");
        assert_eq!(config.rule_sets[0].production_window_years, None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.summary_page_cap(), DEFAULT_SUMMARY_PAGE_CAP);
        assert!(config.rule_sets.is_empty());

        let root = PathBuf::from("/tmp/acred-root");
        assert_eq!(config.data_dir(&root), root.join("data"));
        assert_eq!(config.output_dir(&root), root.join("output"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("cache_ttl_secs = \"soon\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_page_cap_never_below_one() {
        let config = TomlConfig {
            summary_page_cap: Some(0),
            ..TomlConfig::default()
        };
        assert_eq!(config.summary_page_cap(), 1);
    }
}
