//! Configuration persistence with atomic writes and migrations.
//!
//! Stores application configuration in a JSON file with:
//! - Atomic writes (write temp, rename)
//! - Corruption fallback (regenerate defaults if parse fails)
//! - Schema versioning with migration support
//! - Platform-specific config paths

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Current schema version.
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "IntegrationMonitor";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.json";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Schema version for migrations.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Bridge process settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tray presentation settings.
    #[serde(default)]
    pub tray: TrayConfig,

    /// UI settings.
    #[serde(default)]
    pub ui: UiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            backend: BackendConfig::default(),
            tray: TrayConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate and clamp config values to valid ranges.
    pub fn validate_and_clamp(&mut self) {
        // Preview rows: at least 1, at most 50
        self.tray.max_preview_rows = self.tray.max_preview_rows.clamp(1, 50);

        if self.backend.command.trim().is_empty() {
            log::info!("Empty backend.command, resetting to default");
            self.backend.command = BackendConfig::default().command;
        }

        // Validate window dimensions (minimum 200x200)
        self.ui.window_width = self.ui.window_width.max(200);
        self.ui.window_height = self.ui.window_height.max(200);

        // Validate theme selection
        if !matches!(self.ui.theme.as_str(), "system" | "light" | "dark") {
            log::info!(
                "Invalid ui.theme value '{}', resetting to '{}'",
                self.ui.theme,
                default_theme()
            );
            self.ui.theme = default_theme();
        }
    }
}

/// Bridge process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Executable that speaks the bridge protocol on stdio.
    pub command: String,
    /// Extra arguments passed to the bridge.
    pub args: Vec<String>,
    /// Whether to start the bridge with the application.
    pub auto_start: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "integration-bridge".to_string(),
            args: Vec::new(),
            auto_start: true,
        }
    }
}

/// Tray presentation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Maximum per-integration rows in the tray preview.
    pub max_preview_rows: usize,
    /// Whether integrations with zero counts still get a row.
    pub show_all_clear_rows: bool,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            max_preview_rows: 10,
            show_all_clear_rows: true,
        }
    }
}

/// UI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Show the status window on startup.
    pub show_on_startup: bool,
    /// Window width.
    pub window_width: u32,
    /// Window height.
    pub window_height: u32,
    /// Theme preference ("system", "light", "dark").
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_on_startup: false,
            window_width: 600,
            window_height: 500,
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "system".to_string()
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Get the platform-specific config directory path.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(target_os = "windows")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(target_os = "linux")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        PathBuf::from(".").join(CONFIG_DIR_NAME)
    }
}

/// Get the full config file path.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Load configuration from disk.
///
/// If the config file doesn't exist or is corrupted, returns defaults.
/// Corrupted files are backed up for debugging.
pub fn load_config() -> AppConfig {
    load_config_from_path(&config_path())
}

/// Load configuration from a specific path (for testing).
pub fn load_config_from_path(path: &PathBuf) -> AppConfig {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(value) => {
                let mut config = migrate_config(value);
                config.validate_and_clamp();
                config
            }
            Err(e) => {
                log::error!("Config parse error, using defaults: {}", e);
                // Backup corrupt file for debugging
                let backup = path.with_extension("json.corrupt");
                if let Err(backup_err) = fs::rename(path, &backup) {
                    log::warn!("Failed to backup corrupt config: {}", backup_err);
                }
                AppConfig::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No config file found, using defaults");
            AppConfig::default()
        }
        Err(e) => {
            log::error!("Config read error, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

/// Save configuration to disk atomically.
///
/// Writes to a temp file first, then renames to the final path.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to_path(config, &config_path())
}

/// Save configuration to a specific path (for testing).
pub fn save_config_to_path(config: &AppConfig, path: &PathBuf) -> Result<(), ConfigError> {
    let temp = path.with_extension("json.tmp");

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    fs::write(&temp, &json)?;

    // Atomic rename
    fs::rename(&temp, path)?;

    Ok(())
}

/// Migrate configuration from older schema versions.
fn migrate_config(mut config: Value) -> AppConfig {
    let version = config["schema_version"].as_u64().unwrap_or(0) as u32;

    // Migration v0 → v1: the bridge settings moved under "backend"
    if version < 1 {
        if config.get("backend").is_none() {
            if let Some(command) = config.get("bridge_command").cloned() {
                config["backend"] = serde_json::json!({ "command": command });
            }
        }
        config["schema_version"] = serde_json::json!(1);
        log::info!("Migrated config v0 → v1: moved bridge settings under backend");
    }

    // Future migrations go here:
    // if version < 2 { ... }

    serde_json::from_value(config).unwrap_or_else(|e| {
        log::error!("Config migration failed, using defaults: {}", e);
        AppConfig::default()
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
