//! System tray icon and menu implementation.
//!
//! This module provides:
//! - The tray icon, colored by the aggregate health of all integrations
//! - The dropdown menu with the counter line and per-integration preview
//! - The menu-open refresh trigger (the indicator's one inbound event)
//!
//! Menu construction is pure: a [`TrayMenuState`] snapshot goes in, a menu
//! tree comes out, and the whole tree replaces the previous menu on every
//! update. No diffing.

use std::sync::Arc;

use tauri::menu::{
    CheckMenuItemBuilder, Menu, MenuEvent, MenuId, MenuItemBuilder, PredefinedMenuItem,
};
use tauri::tray::{TrayIcon, TrayIconBuilder, TrayIconEvent};
use tauri::{image::Image, AppHandle, Emitter, Manager};
use tokio::sync::RwLock;

use crate::aggregate::AggregatedStatus;
use crate::backend::BridgeManager;
use crate::config;
use crate::event_seq;
use crate::indicator::StatusIndicator;
use crate::state::{IndicatorPhase, StatusEvent, StatusStateManager};

/// Tray menu item IDs.
mod menu_ids {
    pub const HEADER: &str = "header";
    pub const COUNTER: &str = "counter";
    pub const REFRESH: &str = "refresh";
    pub const TOGGLE_HEALTHY: &str = "toggle_healthy";
    pub const BRIDGE_STATUS: &str = "bridge_status";
    pub const TOGGLE_WINDOW: &str = "toggle_window";

    pub const INTEGRATION_PREFIX: &str = "integration::";
}

/// Tray icon files (embedded at compile time).
const ICON_OK: &[u8] = include_bytes!("../icons/tray-ok.png");
const ICON_WARNING: &[u8] = include_bytes!("../icons/tray-warning.png");
const ICON_ATTENTION: &[u8] = include_bytes!("../icons/tray-attention.png");

const MAX_INTEGRATION_NAME_CHARS: usize = 40;

/// Event emitted when the user picks an integration row.
const EVENT_INTEGRATION_SELECTED: &str = "integration:selected";

/// Pure-state snapshot used to build a deterministic tray menu.
#[derive(Debug, Clone, PartialEq)]
pub struct TrayMenuState {
    pub snapshot: AggregatedStatus,
    pub phase: IndicatorPhase,
    pub bridge_state: String,
    pub show_all_clear_rows: bool,
    pub max_preview_rows: usize,
    pub window_visible: bool,
}

/// Pure tray menu tree, independent of any Tauri runtime handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayMenuEntry {
    Separator,
    Action {
        id: String,
        text: String,
        enabled: bool,
    },
    Toggle {
        id: String,
        text: String,
        enabled: bool,
        checked: bool,
    },
    Quit,
}

type SystemTrayMenu = Menu<tauri::Wry>;

/// Pick the icon for the given aggregation: failures dominate, then
/// missing mappings, then all-clear.
fn get_icon_for_status(status: &AggregatedStatus) -> &'static [u8] {
    if status.total_failed > 0 {
        ICON_ATTENTION
    } else if status.total_missing > 0 {
        ICON_WARNING
    } else {
        ICON_OK
    }
}

/// Tooltip text carrying the counter.
fn get_tooltip_text(status: &AggregatedStatus) -> String {
    format!("Integration Monitor - {}", status.counter_text())
}

fn window_label(window_visible: bool) -> &'static str {
    if window_visible {
        "Hide Window"
    } else {
        "Show Window"
    }
}

fn integration_row_text(name: &str, failed: u64, missing: u64) -> String {
    let name = truncate_for_menu(name, MAX_INTEGRATION_NAME_CHARS);
    if failed == 0 && missing == 0 {
        format!("{}: all clear", name)
    } else {
        format!("{}: {} failed, {} missing", name, failed, missing)
    }
}

fn truncate_for_menu(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let chars_count = trimmed.chars().count();

    if chars_count <= max_chars {
        return trimmed.to_string();
    }

    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }

    let mut out = String::with_capacity(max_chars);
    for ch in trimmed.chars().take(max_chars - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}

/// Pure menu builder: deterministic for a given input state.
pub fn build_tray_menu(state: &TrayMenuState) -> Vec<TrayMenuEntry> {
    let mut preview_rows = Vec::new();
    for record in state
        .snapshot
        .records
        .iter()
        .filter(|r| {
            state.show_all_clear_rows
                || r.failed_jobs_count > 0
                || r.missing_mappings_count > 0
        })
        .take(state.max_preview_rows)
    {
        preview_rows.push(TrayMenuEntry::Action {
            id: format!("{}{}", menu_ids::INTEGRATION_PREFIX, record.name),
            text: integration_row_text(
                &record.name,
                record.failed_jobs_count,
                record.missing_mappings_count,
            ),
            enabled: true,
        });
    }
    if preview_rows.is_empty() {
        let text = if state.snapshot.records.is_empty() {
            "No active integrations"
        } else {
            "All integrations healthy"
        };
        preview_rows.push(TrayMenuEntry::Action {
            id: "preview_empty".to_string(),
            text: text.to_string(),
            enabled: false,
        });
    }

    let mut menu = vec![
        TrayMenuEntry::Action {
            id: menu_ids::HEADER.to_string(),
            text: "Integration Monitor".to_string(),
            enabled: false,
        },
        TrayMenuEntry::Separator,
        TrayMenuEntry::Action {
            id: menu_ids::COUNTER.to_string(),
            text: format!("Failed / missing: {}", state.snapshot.counter_text()),
            enabled: false,
        },
        TrayMenuEntry::Separator,
    ];
    menu.extend(preview_rows);
    menu.extend([
        TrayMenuEntry::Separator,
        TrayMenuEntry::Action {
            id: menu_ids::REFRESH.to_string(),
            text: "Refresh Now".to_string(),
            // Refresh needs a mounted indicator
            enabled: state.phase != IndicatorPhase::Unmounted,
        },
        TrayMenuEntry::Toggle {
            id: menu_ids::TOGGLE_HEALTHY.to_string(),
            text: "Show Healthy Integrations".to_string(),
            enabled: true,
            checked: state.show_all_clear_rows,
        },
        TrayMenuEntry::Separator,
        TrayMenuEntry::Action {
            id: menu_ids::BRIDGE_STATUS.to_string(),
            text: format!("Bridge: {}", state.bridge_state),
            enabled: false,
        },
        TrayMenuEntry::Action {
            id: menu_ids::TOGGLE_WINDOW.to_string(),
            text: window_label(state.window_visible).to_string(),
            enabled: true,
        },
        TrayMenuEntry::Quit,
    ]);
    menu
}

fn append_entry_to_menu(
    app: &AppHandle,
    menu: &SystemTrayMenu,
    entry: &TrayMenuEntry,
) -> Result<(), tauri::Error> {
    match entry {
        TrayMenuEntry::Separator => {
            menu.append(&PredefinedMenuItem::separator(app)?)?;
        }
        TrayMenuEntry::Action { id, text, enabled } => {
            let item = MenuItemBuilder::with_id(MenuId::new(id), text)
                .enabled(*enabled)
                .build(app)?;
            menu.append(&item)?;
        }
        TrayMenuEntry::Toggle {
            id,
            text,
            enabled,
            checked,
        } => {
            let item = CheckMenuItemBuilder::with_id(MenuId::new(id), text)
                .enabled(*enabled)
                .checked(*checked)
                .build(app)?;
            menu.append(&item)?;
        }
        TrayMenuEntry::Quit => {
            menu.append(&PredefinedMenuItem::quit(app, Some("Quit"))?)?;
        }
    }

    Ok(())
}

fn load_runtime_tray_menu_state(app: &AppHandle, event: &StatusEvent) -> TrayMenuState {
    let current_config = config::load_config();
    let bridge = app.state::<Arc<BridgeManager>>();

    let window_visible = app
        .get_webview_window("main")
        .and_then(|window| window.is_visible().ok())
        .unwrap_or(false);

    TrayMenuState {
        snapshot: event.status.clone(),
        phase: event.phase,
        bridge_state: bridge.state().as_str().to_string(),
        show_all_clear_rows: current_config.tray.show_all_clear_rows,
        max_preview_rows: current_config.tray.max_preview_rows,
        window_visible,
    }
}

/// Load a PNG icon from bytes into a Tauri Image.
fn load_png_icon(bytes: &[u8]) -> Result<Image<'static>, String> {
    let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
    let mut reader = decoder
        .read_info()
        .map_err(|e| format!("PNG decode error: {}", e))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| format!("PNG frame error: {}", e))?;

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf[..info.buffer_size()].to_vec(),
        png::ColorType::Rgb => {
            let mut rgba = Vec::with_capacity(info.width as usize * info.height as usize * 4);
            for chunk in buf[..info.buffer_size()].chunks(3) {
                rgba.extend_from_slice(chunk);
                rgba.push(255);
            }
            rgba
        }
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(info.width as usize * info.height as usize * 4);
            for chunk in buf[..info.buffer_size()].chunks(2) {
                rgba.push(chunk[0]);
                rgba.push(chunk[0]);
                rgba.push(chunk[0]);
                rgba.push(chunk[1]);
            }
            rgba
        }
        png::ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity(info.width as usize * info.height as usize * 4);
            for &pixel in &buf[..info.buffer_size()] {
                rgba.push(pixel);
                rgba.push(pixel);
                rgba.push(pixel);
                rgba.push(255);
            }
            rgba
        }
        png::ColorType::Indexed => {
            return Err("Indexed PNG not supported".to_string());
        }
    };

    Ok(Image::new_owned(rgba, info.width, info.height))
}

fn build_system_tray_menu(
    app: &AppHandle,
    state: &TrayMenuState,
) -> Result<SystemTrayMenu, tauri::Error> {
    let menu = Menu::new(app)?;
    for entry in build_tray_menu(state) {
        append_entry_to_menu(app, &menu, &entry)?;
    }
    Ok(menu)
}

/// Create and set up the system tray.
fn setup_tray(app: &AppHandle) -> Result<TrayIcon, tauri::Error> {
    let state_manager = app.state::<Arc<StatusStateManager>>();
    let initial_event = state_manager.current_event();
    let tray_menu_state = load_runtime_tray_menu_state(app, &initial_event);
    let menu = build_system_tray_menu(app, &tray_menu_state)?;

    let icon = load_png_icon(get_icon_for_status(&initial_event.status))
        .map_err(|e| tauri::Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tray = TrayIconBuilder::new()
        .icon(icon)
        .tooltip(get_tooltip_text(&initial_event.status))
        .menu(&menu)
        .show_menu_on_left_click(true)
        .on_menu_event(handle_menu_event)
        .on_tray_icon_event(handle_tray_event)
        .build(app)?;

    Ok(tray)
}

fn toggle_window_visibility(app: &AppHandle) {
    if let Some(window) = app.get_webview_window("main") {
        match window.is_visible() {
            Ok(true) => {
                let _ = window.hide();
            }
            Ok(false) => {
                let _ = window.show();
                let _ = window.set_focus();
            }
            Err(err) => {
                log::warn!("Unable to read main window visibility: {}", err);
            }
        }
    }
}

fn toggle_healthy_rows_setting() -> Result<bool, String> {
    let mut cfg = config::load_config();
    cfg.tray.show_all_clear_rows = !cfg.tray.show_all_clear_rows;
    config::save_config(&cfg).map_err(|e| e.to_string())?;
    Ok(cfg.tray.show_all_clear_rows)
}

/// Spawn an asynchronous refresh; the menu is never blocked on it.
fn spawn_refresh(app: &AppHandle) {
    let indicator = Arc::clone(&*app.state::<Arc<StatusIndicator>>());
    tauri::async_runtime::spawn(async move {
        // Failures keep the last committed snapshot; nothing to do here
        let _ = indicator.refresh().await;
    });
}

/// Handle menu item clicks.
fn handle_menu_event(app: &AppHandle, event: MenuEvent) {
    let id = event.id().as_ref();

    if let Some(name) = id.strip_prefix(menu_ids::INTEGRATION_PREFIX) {
        log::info!("Integration row selected: {}", name);
        let _ = app.emit(
            EVENT_INTEGRATION_SELECTED,
            event_seq::payload_with_next_seq(serde_json::json!({ "name": name })),
        );
        if let Some(window) = app.get_webview_window("main") {
            let _ = window.show();
            let _ = window.set_focus();
        }
        return;
    }

    match id {
        menu_ids::REFRESH => {
            spawn_refresh(app);
        }
        menu_ids::TOGGLE_HEALTHY => match toggle_healthy_rows_setting() {
            Ok(now_shown) => {
                log::info!("Healthy rows toggled to {}", now_shown);
                // Re-render the menu with the new filter
                let state_manager = app.state::<Arc<StatusStateManager>>();
                state_manager.touch();
            }
            Err(err) => log::warn!("Failed to toggle healthy rows from tray: {}", err),
        },
        menu_ids::TOGGLE_WINDOW => {
            toggle_window_visibility(app);
        }
        _ => {
            log::debug!("Tray: Unhandled menu event: {}", id);
        }
    }
}

/// Handle tray icon events (clicks, etc).
///
/// A click is the "dropdown is opening" trigger: the menu opens
/// immediately and the preview content catches up once the refresh lands.
fn handle_tray_event(tray: &TrayIcon, event: TrayIconEvent) {
    match event {
        TrayIconEvent::Click { .. } => {
            spawn_refresh(tray.app_handle());
        }
        TrayIconEvent::DoubleClick { .. } => {
            let app = tray.app_handle();
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.show();
                let _ = window.set_focus();
            }
        }
        _ => {}
    }
}

/// Tray manager for updating tray state.
pub struct TrayManager {
    tray: Option<TrayIcon>,
    app_handle: AppHandle,
}

impl TrayManager {
    /// Create a new tray manager.
    pub fn new(app_handle: AppHandle) -> Self {
        Self {
            tray: None,
            app_handle,
        }
    }

    /// Initialize the tray icon.
    pub fn init(&mut self) -> Result<(), String> {
        let tray = setup_tray(&self.app_handle).map_err(|e| e.to_string())?;
        self.tray = Some(tray);
        log::info!("Tray icon initialized");
        Ok(())
    }

    /// Update tray icon, tooltip, and menu from a status event.
    ///
    /// The previous menu is replaced wholesale.
    pub fn update(&self, event: &StatusEvent) -> Result<(), String> {
        let tray = self
            .tray
            .as_ref()
            .ok_or_else(|| "Tray not initialized".to_string())?;

        let icon = load_png_icon(get_icon_for_status(&event.status))?;
        tray.set_icon(Some(icon)).map_err(|e| e.to_string())?;

        let tooltip = get_tooltip_text(&event.status);
        tray.set_tooltip(Some(tooltip)).map_err(|e| e.to_string())?;

        let state = load_runtime_tray_menu_state(&self.app_handle, event);
        let menu = build_system_tray_menu(&self.app_handle, &state).map_err(|e| e.to_string())?;
        tray.set_menu(Some(menu)).map_err(|e| e.to_string())?;

        Ok(())
    }
}

/// Start the tray update loop: re-render on every committed snapshot.
pub fn start_tray_loop(
    state_manager: Arc<StatusStateManager>,
    tray_manager: Arc<RwLock<TrayManager>>,
) {
    tauri::async_runtime::spawn(async move {
        let mut receiver = state_manager.subscribe();

        log::info!("Tray update loop started");

        while let Ok(event) = receiver.recv().await {
            let tray = tray_manager.read().await;
            if let Err(e) = tray.update(&event) {
                log::warn!("Failed to update tray: {}", e);
            }
        }

        log::info!("Tray update loop ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, IntegrationStatusRecord};

    fn sample_state() -> TrayMenuState {
        TrayMenuState {
            snapshot: aggregate(vec![
                IntegrationStatusRecord::new("Shopify", 2, 1),
                IntegrationStatusRecord::new("Magento", 0, 0),
            ]),
            phase: IndicatorPhase::Fresh,
            bridge_state: "running".to_string(),
            show_all_clear_rows: true,
            max_preview_rows: 10,
            window_visible: false,
        }
    }

    #[test]
    fn test_icon_selection_failures_dominate() {
        let attention = aggregate(vec![IntegrationStatusRecord::new("A", 1, 5)]);
        assert_eq!(get_icon_for_status(&attention), ICON_ATTENTION);

        let warning = aggregate(vec![IntegrationStatusRecord::new("A", 0, 5)]);
        assert_eq!(get_icon_for_status(&warning), ICON_WARNING);

        let ok = aggregate(Vec::new());
        assert_eq!(get_icon_for_status(&ok), ICON_OK);
    }

    #[test]
    fn test_tooltip_carries_counter() {
        let status = aggregate(vec![IntegrationStatusRecord::new("A", 3, 12)]);
        assert_eq!(get_tooltip_text(&status), "Integration Monitor - 3 / 12");
    }

    #[test]
    fn test_truncate_for_menu_applies_ascii_ellipsis() {
        let input = "012345678901234567890123456789012345678901234567890123456789";
        let out = truncate_for_menu(input, 40);
        assert_eq!(out.len(), 40);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_build_tray_menu_core_structure_and_labels() {
        let menu = build_tray_menu(&sample_state());

        assert!(matches!(
            menu.first(),
            Some(TrayMenuEntry::Action { id, text, enabled })
                if id == menu_ids::HEADER && text == "Integration Monitor" && !enabled
        ));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, text, .. }
                    if id == menu_ids::COUNTER && text == "Failed / missing: 2 / 1"
            )
        }));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, text, enabled }
                    if id == "integration::Shopify"
                        && text == "Shopify: 2 failed, 1 missing"
                        && *enabled
            )
        }));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, text, .. }
                    if id == "integration::Magento" && text == "Magento: all clear"
            )
        }));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, text, enabled }
                    if id == menu_ids::REFRESH && text == "Refresh Now" && *enabled
            )
        }));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Toggle { id, checked, .. }
                    if id == menu_ids::TOGGLE_HEALTHY && *checked
            )
        }));

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, text, .. }
                    if id == menu_ids::BRIDGE_STATUS && text == "Bridge: running"
            )
        }));

        assert!(matches!(menu.last(), Some(TrayMenuEntry::Quit)));
    }

    #[test]
    fn test_healthy_rows_hidden_when_filtered() {
        let mut state = sample_state();
        state.show_all_clear_rows = false;

        let menu = build_tray_menu(&state);

        assert!(menu.iter().any(|entry| {
            matches!(entry, TrayMenuEntry::Action { id, .. } if id == "integration::Shopify")
        }));
        assert!(!menu.iter().any(|entry| {
            matches!(entry, TrayMenuEntry::Action { id, .. } if id == "integration::Magento")
        }));
    }

    #[test]
    fn test_all_healthy_and_filtered_shows_placeholder() {
        let mut state = sample_state();
        state.snapshot = aggregate(vec![IntegrationStatusRecord::new("Magento", 0, 0)]);
        state.show_all_clear_rows = false;

        let menu = build_tray_menu(&state);

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { text, enabled, .. }
                    if text == "All integrations healthy" && !enabled
            )
        }));
    }

    #[test]
    fn test_empty_batch_shows_no_integrations_placeholder() {
        let mut state = sample_state();
        state.snapshot = aggregate(Vec::new());

        let menu = build_tray_menu(&state);

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { text, enabled, .. }
                    if text == "No active integrations" && !enabled
            )
        }));
    }

    #[test]
    fn test_preview_rows_limited_to_configured_maximum() {
        let mut state = sample_state();
        state.snapshot = aggregate(
            (0..20)
                .map(|idx| IntegrationStatusRecord::new(format!("Connector {}", idx), 1, 0))
                .collect(),
        );
        state.max_preview_rows = 5;

        let menu = build_tray_menu(&state);
        let rows = menu
            .iter()
            .filter(|entry| {
                matches!(
                    entry,
                    TrayMenuEntry::Action { id, .. }
                        if id.starts_with(menu_ids::INTEGRATION_PREFIX)
                )
            })
            .count();

        assert_eq!(rows, 5);
    }

    #[test]
    fn test_refresh_disabled_while_unmounted() {
        let mut state = sample_state();
        state.phase = IndicatorPhase::Unmounted;

        let menu = build_tray_menu(&state);

        assert!(menu.iter().any(|entry| {
            matches!(
                entry,
                TrayMenuEntry::Action { id, enabled, .. }
                    if id == menu_ids::REFRESH && !enabled
            )
        }));
    }

    #[test]
    fn test_menu_ids_unique() {
        let ids = [
            menu_ids::HEADER,
            menu_ids::COUNTER,
            menu_ids::REFRESH,
            menu_ids::TOGGLE_HEALTHY,
            menu_ids::BRIDGE_STATUS,
            menu_ids::TOGGLE_WINDOW,
        ];

        let mut seen = std::collections::HashSet::new();
        for id in ids {
            assert!(seen.insert(id), "Duplicate menu ID: {}", id);
        }
    }

    #[test]
    fn test_icon_bytes_not_empty() {
        assert!(!ICON_OK.is_empty());
        assert!(!ICON_WARNING.is_empty());
        assert!(!ICON_ATTENTION.is_empty());
    }

    #[test]
    fn test_load_png_icon() {
        for bytes in [ICON_OK, ICON_WARNING, ICON_ATTENTION] {
            let result = load_png_icon(bytes);
            assert!(result.is_ok(), "Failed to load icon: {:?}", result.err());
        }
    }
}
