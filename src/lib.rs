//! Integration Monitor - Tauri backend library
//!
//! A system-tray status indicator summarizing the health of configured
//! external integrations: failed background jobs and unresolved data
//! mappings, fetched on demand from the integration bridge.

use std::sync::Arc;

use tauri::Manager;
use tokio::sync::RwLock;

pub mod aggregate;
pub mod backend;
pub mod commands;
pub mod config;
pub mod errors;
pub mod event_seq;
pub mod fetch;
pub mod indicator;
pub mod ipc;
pub mod state;
pub mod tray;

use backend::BridgeManager;
use fetch::RpcStatusFetch;
use indicator::StatusIndicator;
use state::StatusStateManager;
use tray::TrayManager;

/// Webview event carrying each committed snapshot.
const EVENT_STATUS_UPDATED: &str = "status:updated";

/// Configure and run the Tauri application.
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let state_manager = Arc::new(StatusStateManager::new());
    let bridge = Arc::new(BridgeManager::new());
    let indicator = Arc::new(StatusIndicator::new(
        Arc::new(RpcStatusFetch::new(Arc::clone(&bridge))),
        Arc::clone(&state_manager),
    ));

    tauri::Builder::default()
        .manage(Arc::clone(&state_manager))
        .manage(Arc::clone(&bridge))
        .manage(Arc::clone(&indicator))
        .invoke_handler(tauri::generate_handler![
            commands::get_status_snapshot,
            commands::refresh_status,
            commands::get_config,
            commands::set_config,
            commands::get_bridge_status,
            commands::restart_bridge,
        ])
        .setup(move |app| {
            bridge.set_app_handle(app.handle().clone());

            // Tray: renderer plus the menu-open refresh trigger
            let mut tray_manager = TrayManager::new(app.handle().clone());
            tray_manager.init()?;
            let tray_manager = Arc::new(RwLock::new(tray_manager));
            tray::start_tray_loop(Arc::clone(&state_manager), tray_manager);

            // Mirror committed snapshots to the status window
            let app_handle = app.handle().clone();
            let mut status_rx = state_manager.subscribe();
            tauri::async_runtime::spawn(async move {
                use tauri::Emitter;

                while let Ok(event) = status_rx.recv().await {
                    match serde_json::to_value(&event) {
                        Ok(value) => {
                            let _ = app_handle
                                .emit(EVENT_STATUS_UPDATED, event_seq::payload_with_next_seq(value));
                        }
                        Err(e) => log::warn!("Failed to serialize status event: {}", e),
                    }
                }
            });

            // Start the bridge, then mount the indicator (first fetch+render).
            // Mount completes even when the bridge is down; the tray shows
            // the empty aggregation until a refresh succeeds.
            let startup_bridge = Arc::clone(&bridge);
            let startup_indicator = Arc::clone(&indicator);
            tauri::async_runtime::spawn(async move {
                let cfg = config::load_config();
                if cfg.backend.auto_start {
                    if let Err(e) = startup_bridge.start(&cfg.backend).await {
                        log::error!("Failed to start bridge: {}", e);
                    }
                }
                startup_indicator.mount().await;
            });

            if config::load_config().ui.show_on_startup {
                if let Some(window) = app.get_webview_window("main") {
                    let _ = window.show();
                }
            }

            log::info!("Integration Monitor starting");
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
