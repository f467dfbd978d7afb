//! Tauri commands exposed to the status window.
//!
//! The webview is a thin observer: it reads the same committed snapshot the
//! tray renders, can trigger the same refresh the tray click triggers, and
//! edits the persisted configuration.

use serde::Serialize;
use thiserror::Error;

use std::sync::Arc;

use crate::backend::{BridgeManager, BridgeStatus};
use crate::config::{self, AppConfig};
use crate::errors::AppError;
use crate::indicator::StatusIndicator;
use crate::state::{StatusEvent, StatusStateManager};

/// Command error types.
#[derive(Debug, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum CommandError {
    #[error("Config error: {message}")]
    Config { message: String },

    #[error("Bridge error: {message}")]
    Bridge { message: String },

    #[error("Refresh failed: {error}")]
    Refresh { error: AppError },
}

impl From<config::ConfigError> for CommandError {
    fn from(e: config::ConfigError) -> Self {
        CommandError::Config {
            message: e.to_string(),
        }
    }
}

// ============================================================================
// STATUS COMMANDS
// ============================================================================

/// Get the current phase and committed snapshot.
#[tauri::command]
pub fn get_status_snapshot(
    state_manager: tauri::State<'_, Arc<StatusStateManager>>,
) -> StatusEvent {
    state_manager.current_event()
}

/// Run one refresh cycle and return the resulting state.
///
/// On failure the previously committed snapshot is returned untouched
/// alongside the error.
#[tauri::command]
pub async fn refresh_status(
    indicator: tauri::State<'_, Arc<StatusIndicator>>,
) -> Result<StatusEvent, CommandError> {
    indicator.refresh().await.map_err(|e| CommandError::Refresh {
        error: AppError::from_rpc(&e),
    })?;
    Ok(indicator.state().current_event())
}

// ============================================================================
// CONFIG COMMANDS
// ============================================================================

/// Get the persisted configuration.
#[tauri::command]
pub fn get_config() -> AppConfig {
    config::load_config()
}

/// Persist a new configuration.
///
/// Values are clamped before saving; the stored result is returned.
#[tauri::command]
pub fn set_config(
    state_manager: tauri::State<'_, Arc<StatusStateManager>>,
    mut new_config: AppConfig,
) -> Result<AppConfig, CommandError> {
    new_config.validate_and_clamp();
    config::save_config(&new_config)?;

    // Tray presentation settings may have changed
    state_manager.touch();

    Ok(new_config)
}

// ============================================================================
// BRIDGE COMMANDS
// ============================================================================

/// Get the current bridge process status.
#[tauri::command]
pub fn get_bridge_status(bridge: tauri::State<'_, Arc<BridgeManager>>) -> BridgeStatus {
    bridge.status()
}

/// Stop and restart the bridge process, then refresh.
#[tauri::command]
pub async fn restart_bridge(
    bridge: tauri::State<'_, Arc<BridgeManager>>,
    indicator: tauri::State<'_, Arc<StatusIndicator>>,
) -> Result<BridgeStatus, CommandError> {
    bridge.stop().await;

    let cfg = config::load_config();
    bridge
        .start(&cfg.backend)
        .await
        .map_err(|message| CommandError::Bridge { message })?;

    // Best effort: repopulate the snapshot from the fresh bridge
    if let Err(e) = indicator.refresh().await {
        log::warn!("Refresh after bridge restart failed: {}", e);
    }

    Ok(bridge.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::RpcError;

    #[test]
    fn test_command_error_serializes_with_code_tag() {
        let err = CommandError::Config {
            message: "boom".to_string(),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value.get("code"), Some(&serde_json::json!("config")));
        assert_eq!(value.get("message"), Some(&serde_json::json!("boom")));
    }

    #[test]
    fn test_refresh_error_carries_classified_kind() {
        let err = CommandError::Refresh {
            error: AppError::from_rpc(&RpcError::Disconnected),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value.get("code"), Some(&serde_json::json!("refresh")));
        assert_eq!(
            value
                .get("error")
                .and_then(|e| e.get("kind"))
                .and_then(|k| k.as_str()),
            Some("backend_unavailable")
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CommandError = config::ConfigError::Io(io).into();
        assert!(err.to_string().contains("Config error"));
    }
}
