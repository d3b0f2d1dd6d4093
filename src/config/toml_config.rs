//! TOML Configuration with Environment Variable Overrides
//!
//! - TOML configuration file (`<config_dir>/quickdial/config.toml`)
//! - Environment variable overrides (`QUICKDIAL_*`)
//! - Atomic writes with backup

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub tray: TrayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub worker: WorkerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// SQLite file holding the selection table
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(crate::selection::SelectionTable::default_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DirectoryConfig {
    /// JSON file with the contact records
    #[serde(default)]
    pub contacts_file: Option<PathBuf>,
}

impl DirectoryConfig {
    pub fn contacts_path(&self) -> PathBuf {
        self.contacts_file
            .clone()
            .unwrap_or_else(|| crate::utils::config_dir().join("contacts.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TrayConfig {
    /// JSON file the CLI renders notifications into
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl TrayConfig {
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| crate::utils::data_dir().join("tray.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "quickdial=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    16
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

impl From<&WorkerSection> for crate::reconcile::WorkerConfig {
    fn from(section: &WorkerSection) -> Self {
        Self {
            queue_depth: section.queue_depth,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub fn default_config_path() -> PathBuf {
    crate::utils::config_dir().join("config.toml")
}

/// Load the config at `path`, falling back to defaults, then apply env overrides
pub fn load_toml_config(path: &Path) -> TomlConfig {
    let mut config = TomlConfig::default();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<TomlConfig>(&contents) {
                Ok(parsed) => {
                    tracing::info!("Loaded TOML config from {:?}", path);
                    config = parsed;
                }
                Err(e) => tracing::warn!("Ignoring invalid config {:?}: {}", path, e),
            },
            Err(e) => tracing::warn!("Could not read config {:?}: {}", path, e),
        }
    }

    apply_env_overrides(config, |key| std::env::var(key).ok())
}

pub fn save_toml_config(config: &TomlConfig, path: &Path) -> Result<(), ConfigError> {
    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Create backup if file exists
    if path.exists() {
        let backup_path = path.with_extension("toml.bak");
        let _ = fs::copy(path, &backup_path);
    }

    let contents = toml::to_string_pretty(config)?;

    // Write to temp file first, then rename over the old file
    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, &contents)?;
    fs::rename(&temp_path, path)?;

    tracing::info!("Saved TOML config to {:?}", path);
    Ok(())
}

/// Overrides: QUICKDIAL_DATABASE, QUICKDIAL_CONTACTS, QUICKDIAL_TRAY,
/// QUICKDIAL_LOG, QUICKDIAL_QUEUE_DEPTH
pub fn apply_env_overrides(
    mut config: TomlConfig,
    var: impl Fn(&str) -> Option<String>,
) -> TomlConfig {
    let non_empty = |key: &str| var(key).filter(|v| !v.is_empty());

    if let Some(database) = non_empty("QUICKDIAL_DATABASE") {
        config.storage.database = Some(PathBuf::from(database));
    }

    if let Some(contacts) = non_empty("QUICKDIAL_CONTACTS") {
        config.directory.contacts_file = Some(PathBuf::from(contacts));
    }

    if let Some(tray) = non_empty("QUICKDIAL_TRAY") {
        config.tray.state_file = Some(PathBuf::from(tray));
    }

    if let Some(filter) = non_empty("QUICKDIAL_LOG") {
        config.logging.filter = filter;
    }

    if let Some(depth) = non_empty("QUICKDIAL_QUEUE_DEPTH") {
        match depth.parse::<usize>() {
            Ok(d) if d > 0 => config.worker.queue_depth = d,
            _ => tracing::warn!("Ignoring invalid QUICKDIAL_QUEUE_DEPTH={:?}", depth),
        }
    }

    config
}
