//! Configuration management for Markpull.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound for concurrent page fetches.
pub const MAX_CONCURRENCY: usize = 32;

/// Largest page the registry serves. A larger request is silently capped,
/// which would make every full page look like the last one.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Main application configuration.
///
/// This is loaded from `~/.config/markpull/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote registry connection settings
    pub registry: RegistryConfig,
    /// Fetch scheduling settings
    pub acquisition: AcquisitionConfig,
    /// Export settings
    pub output: OutputConfig,
    /// Processed-document ledger settings
    pub ledger: LedgerConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `MARKPULL_BASE_URL`: Override the registry base URL
    /// - `MARKPULL_CONCURRENCY`: Override the number of concurrent page fetches
    /// - `MARKPULL_OUTPUT_DIR`: Override the export directory
    /// - `MARKPULL_LEDGER_PATH`: Override the ledger file location
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Unparseable values are ignored and the configured value is kept.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MARKPULL_BASE_URL") {
            tracing::debug!("Override registry.base_url from env: {}", url);
            self.registry.base_url = url;
        }

        if let Some(val) = lookup("MARKPULL_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.acquisition.concurrency = concurrency;
                tracing::debug!("Override acquisition.concurrency from env: {}", concurrency);
            }
        }

        if let Some(dir) = lookup("MARKPULL_OUTPUT_DIR") {
            tracing::debug!("Override output.directory from env: {}", dir);
            self.output.directory = Some(PathBuf::from(dir));
        }

        if let Some(path) = lookup("MARKPULL_LEDGER_PATH") {
            tracing::debug!("Override ledger.path from env: {}", path);
            self.ledger.path = Some(PathBuf::from(path));
        }
    }

    /// Check every section that has constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        self.registry.validate()?;
        self.acquisition.validate()
    }

    /// Write the configuration to the default config file.
    pub fn save(&self) -> ConfigResult<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Write the configuration as TOML to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        tracing::debug!("Saving config to {}", path.display());
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/markpull/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/markpull`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    /// Directory exports are written to, falling back to `<data_dir>/exports`.
    pub fn output_dir(&self) -> ConfigResult<PathBuf> {
        match &self.output.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("exports")),
        }
    }

    /// Ledger file location, falling back to `<data_dir>/processed_documents.txt`.
    pub fn ledger_path(&self) -> ConfigResult<PathBuf> {
        match &self.ledger.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("processed_documents.txt")),
        }
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "markpull", "markpull").ok_or(ConfigError::NoConfigDir)
}

/// Remote registry connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry API, without a trailing slash
    pub base_url: String,
    /// Maximum number of records per page
    pub page_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://markirovka.crpt.ru/api/v4/true-api".to_string(),
            page_size: 1000,
            timeout_secs: 30,
            user_agent: format!("Markpull/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RegistryConfig {
    /// Reject page sizes the registry cannot honour.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "registry.page_size".to_string(),
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size),
            });
        }
        Ok(())
    }
}

/// Fetch scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Number of concurrent page fetches (K)
    pub concurrency: usize,
    /// Delay before the single retry of a transient failure, in milliseconds
    pub retry_delay_ms: u64,
    /// Minimum interval between progress emissions, in milliseconds
    pub progress_interval_ms: u64,
    /// Pause between consecutive detail requests, in milliseconds
    pub detail_delay_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry_delay_ms: 1000,
            progress_interval_ms: 500,
            detail_delay_ms: 200,
        }
    }
}

impl AcquisitionConfig {
    /// Check that the settings describe a runnable acquisition.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                field: "acquisition.concurrency".to_string(),
                reason: format!("must be between 1 and {MAX_CONCURRENCY}, got {}", self.concurrency),
            });
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "acquisition.progress_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Export directory; `None` means the data directory's `exports/`
    pub directory: Option<PathBuf>,
    /// Field delimiter for exported files
    pub delimiter: char,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            delimiter: ';',
        }
    }
}

/// Processed-document ledger settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger file; `None` means the data directory's `processed_documents.txt`
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.registry.page_size, 1000);
        assert_eq!(config.acquisition.concurrency, 5);
        assert_eq!(config.acquisition.retry_delay_ms, 1000);
        assert_eq!(config.acquisition.progress_interval_ms, 500);
        assert_eq!(config.output.delimiter, ';');
        assert!(config.ledger.path.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[registry]"));
        assert!(toml_str.contains("[acquisition]"));
        assert!(toml_str.contains("[output]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.registry.base_url, config.registry.base_url);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("markpull").join("config.toml");

        let mut config = AppConfig::default();
        config.acquisition.concurrency = 8;
        config.output.directory = Some(tmp.path().join("exports"));
        config.save_to(&config_path).expect("save config");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.acquisition.concurrency, 8);
        assert_eq!(loaded.output_dir().unwrap(), tmp.path().join("exports"));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load");
        assert_eq!(loaded.acquisition.concurrency, 5);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MARKPULL_BASE_URL", "http://localhost:9000"),
            ("MARKPULL_CONCURRENCY", "12"),
            ("MARKPULL_LEDGER_PATH", "/tmp/ledger.txt"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.registry.base_url, "http://localhost:9000");
        assert_eq!(config.acquisition.concurrency, 12);
        assert_eq!(
            config.ledger_path().unwrap(),
            PathBuf::from("/tmp/ledger.txt")
        );
        assert!(config.output.directory.is_none());
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| {
            (key == "MARKPULL_CONCURRENCY").then(|| "lots".to_string())
        });
        assert_eq!(config.acquisition.concurrency, 5);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[acquisition]
concurrency = 2

[output]
delimiter = ","
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.acquisition.concurrency, 2);
        assert_eq!(config.output.delimiter, ',');
        // These should be defaults
        assert_eq!(config.acquisition.retry_delay_ms, 1000);
        assert_eq!(config.registry.page_size, 1000);
    }

    #[test]
    fn test_validate_concurrency() {
        let mut acquisition = AcquisitionConfig::default();
        assert!(acquisition.validate().is_ok());

        acquisition.concurrency = 0;
        assert!(acquisition.validate().is_err());

        acquisition.concurrency = MAX_CONCURRENCY + 1;
        assert!(acquisition.validate().is_err());

        acquisition.concurrency = 1;
        acquisition.progress_interval_ms = 0;
        assert!(acquisition.validate().is_err());
    }

    #[test]
    fn test_validate_page_size() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.registry.page_size = MAX_PAGE_SIZE;
        assert!(config.validate().is_ok());

        config.registry.page_size = 2000;
        let err = config.validate().expect_err("page above registry cap");
        assert!(err.to_string().contains("registry.page_size"));

        config.registry.page_size = 0;
        assert!(config.validate().is_err());
    }
}
