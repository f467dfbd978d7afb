//! Bridge process lifecycle management.
//!
//! This module spawns and supervises the integration bridge, the child
//! process that fronts the actual integration platform and speaks
//! line-delimited JSON-RPC on its stdio. Retry and backoff policy live
//! with the transport owner (the user restarts via the UI), not with the
//! status indicator.

use std::process::Stdio;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tauri::{AppHandle, Emitter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::BackendConfig;
use crate::ipc::{methods, RpcClient};

/// Event name for bridge status changes.
const EVENT_BACKEND_STATUS: &str = "backend:status";

/// How often the monitor task checks the child process.
const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period between `system.shutdown` and a forced kill.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Initial state before first spawn.
    NotStarted,
    /// Spawn in progress.
    Starting,
    /// Process alive and IPC working.
    Running,
    /// Process exited unexpectedly; manual restart needed.
    Failed,
    /// Graceful shutdown in progress.
    ShuttingDown,
}

impl BridgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::ShuttingDown => "shutting down",
        }
    }
}

/// Status event payload.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub message: Option<String>,
}

/// Internal bridge state.
struct BridgeInner {
    state: BridgeState,
    child: Option<Child>,
    client: Option<Arc<RpcClient>>,
    last_error: Option<String>,
}

/// Bridge manager for process lifecycle management.
pub struct BridgeManager {
    inner: Arc<Mutex<BridgeInner>>,
    app_handle: RwLock<Option<AppHandle>>,
}

impl BridgeManager {
    /// Create a new bridge manager.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BridgeInner {
                state: BridgeState::NotStarted,
                child: None,
                client: None,
                last_error: None,
            })),
            app_handle: RwLock::new(None),
        }
    }

    /// Set the Tauri app handle for emitting events.
    pub fn set_app_handle(&self, handle: AppHandle) {
        *self.app_handle.write().unwrap() = Some(handle);
    }

    /// Get the current bridge state.
    pub fn state(&self) -> BridgeState {
        self.inner.lock().unwrap().state
    }

    /// Get the current status.
    pub fn status(&self) -> BridgeStatus {
        let inner = self.inner.lock().unwrap();
        BridgeStatus {
            state: inner.state,
            message: inner.last_error.clone(),
        }
    }

    /// The RPC client for the running bridge, if any.
    pub fn client(&self) -> Option<Arc<RpcClient>> {
        self.inner.lock().unwrap().client.clone()
    }

    /// Emit a status event to the frontend.
    fn emit_status(&self, status: BridgeStatus) {
        if let Some(ref handle) = *self.app_handle.read().unwrap() {
            let _ = handle.emit(EVENT_BACKEND_STATUS, status);
        }
    }

    /// Start the bridge process and return its RPC client.
    ///
    /// Must run inside the async runtime: the RPC client and the monitor
    /// task are spawned on it.
    pub async fn start(&self, config: &BackendConfig) -> Result<Arc<RpcClient>, String> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == BridgeState::Running {
                if let Some(client) = inner.client.clone() {
                    return Ok(client);
                }
            }
            inner.state = BridgeState::Starting;
        }

        self.emit_status(BridgeStatus {
            state: BridgeState::Starting,
            message: Some(format!("Starting bridge: {}", config.command)),
        });

        log::info!("Spawning bridge process: {} {:?}", config.command, config.args);

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn bridge: {}", e))?;

        let pid = child.id();
        log::info!("Bridge spawned with PID {:?}", pid);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Bridge stdin not piped".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Bridge stdout not piped".to_string())?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::stderr_loop(stderr));
        }

        let client = Arc::new(RpcClient::new(stdin, stdout));

        // Unsolicited bridge notifications are logged only; the indicator
        // refreshes on demand, never from push updates
        let mut notifications = client.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = notifications.recv().await {
                log::debug!("Bridge notification: {}: {}", event.method, event.params);
            }
        });

        {
            let mut inner = self.inner.lock().unwrap();
            inner.child = Some(child);
            inner.client = Some(Arc::clone(&client));
            inner.state = BridgeState::Running;
            inner.last_error = None;
        }

        self.emit_status(BridgeStatus {
            state: BridgeState::Running,
            message: pid.map(|p| format!("Bridge running (PID {})", p)),
        });

        self.start_monitor_task();

        Ok(client)
    }

    /// Forward bridge stderr lines into the application log.
    async fn stderr_loop(stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::warn!("bridge: {}", line);
        }
    }

    /// Watch the child process and flag unexpected exits.
    fn start_monitor_task(&self) {
        let inner = Arc::clone(&self.inner);
        let app_handle = self.app_handle.read().unwrap().clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
            loop {
                ticker.tick().await;

                let exited = {
                    let mut guard = inner.lock().unwrap();
                    if guard.state != BridgeState::Running {
                        // Stopped or replaced; this monitor is done
                        break;
                    }
                    match guard.child.as_mut().map(|c| c.try_wait()) {
                        Some(Ok(Some(status))) => {
                            log::warn!("Bridge exited with status: {:?}", status);
                            guard.state = BridgeState::Failed;
                            guard.last_error = Some(format!("Process exited: {:?}", status));
                            guard.child = None;
                            guard.client = None;
                            true
                        }
                        Some(Ok(None)) => false,
                        Some(Err(e)) => {
                            log::error!("Error checking bridge status: {}", e);
                            false
                        }
                        None => break,
                    }
                };

                if exited {
                    if let Some(ref handle) = app_handle {
                        let _ = handle.emit(
                            EVENT_BACKEND_STATUS,
                            BridgeStatus {
                                state: BridgeState::Failed,
                                message: Some("Bridge exited unexpectedly".to_string()),
                            },
                        );
                    }
                    break;
                }
            }
        });
    }

    /// Stop the bridge process.
    ///
    /// Attempts a graceful `system.shutdown` first, then kills the child.
    pub async fn stop(&self) {
        log::info!("Stopping bridge");

        let client = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = BridgeState::ShuttingDown;
            inner.client.take()
        };

        if let Some(client) = client {
            let shutdown = client.call::<serde_json::Value>(
                methods::SYSTEM_SHUTDOWN,
                Some(json!({})),
            );
            if tokio::time::timeout(SHUTDOWN_GRACE, shutdown).await.is_err() {
                log::warn!("Bridge did not acknowledge shutdown in time");
            }
            client.shutdown().await;
        }

        let child = {
            let mut inner = self.inner.lock().unwrap();
            inner.child.take()
        };

        if let Some(mut child) = child {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            match child.try_wait() {
                Ok(None) => {
                    log::warn!("Bridge did not exit gracefully, killing");
                    let _ = child.kill().await;
                }
                Ok(Some(status)) => log::info!("Bridge exited: {:?}", status),
                Err(e) => log::error!("Error waiting for bridge exit: {}", e),
            }
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = BridgeState::NotStarted;
            inner.last_error = None;
        }

        self.emit_status(BridgeStatus {
            state: BridgeState::NotStarted,
            message: None,
        });
    }
}

impl Default for BridgeManager {
    fn default() -> Self {
        Self::new()
    }
}
