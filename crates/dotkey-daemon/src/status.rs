use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Local;
use dotkey_core::pause::{PauseCoordinator, PauseReason};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The four states the status surface presents (menu-bar icon, settings
/// panel, `dotkey status`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationState {
    Active,
    Paused,
    Warning,
    Error,
}

/// Where the mapped state gets presented. The tray icon and the settings
/// panel implement this; tests use a recording sink.
pub trait StatusSink: Send {
    fn present(&self, state: PresentationState, reason: &str);
}

/// Read-only status snapshot for the command surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub state: PresentationState,
    pub reason: String,
}

/// Heartbeats are emitted on the monitor's timer and recorded when the
/// engine loop consumes them; one older than this means the event pipeline
/// (channel or engine loop) is stalled or dead.
const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(15);

/// How many diagnostic lines to retain.
const DIAGNOSTIC_CAPACITY: usize = 200;

#[derive(Debug)]
struct StatusInner {
    last_presented: Option<PresentationState>,
    last_heartbeat: Option<Instant>,
    monitor_failures: u32,
    monitor_dead: bool,
    diagnostics: VecDeque<String>,
}

/// Stateless presenter over the pause coordinator and monitor health.
///
/// Re-presentation is coalesced: the sink is only invoked when the mapped
/// state actually changes, so noisy upstream events do not turn into a storm
/// of system calls.
pub struct StatusSurface {
    inner: Mutex<StatusInner>,
    sink: Mutex<Option<Box<dyn StatusSink>>>,
}

impl Default for StatusSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSurface {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                last_presented: None,
                last_heartbeat: None,
                monitor_failures: 0,
                monitor_dead: false,
                diagnostics: VecDeque::with_capacity(DIAGNOSTIC_CAPACITY),
            }),
            sink: Mutex::new(None),
        }
    }

    pub fn set_sink(&self, sink: Box<dyn StatusSink>) {
        *self.lock_sink() = Some(sink);
    }

    /// Record a monitor heartbeat.
    pub fn record_heartbeat(&self) {
        self.lock().last_heartbeat = Some(Instant::now());
    }

    /// Age the last heartbeat, standing in for a stalled pipeline.
    #[cfg(test)]
    fn backdate_heartbeat(&self, age: Duration) {
        self.lock().last_heartbeat = Instant::now().checked_sub(age);
    }

    /// Record a monitor attach/listen failure (recoverable; presented as
    /// Warning while retries continue).
    pub fn record_monitor_failure(&self) {
        let mut inner = self.lock();
        inner.monitor_failures = inner.monitor_failures.saturating_add(1);
    }

    /// The monitor exhausted its restart budget.
    pub fn record_monitor_death(&self) {
        self.lock().monitor_dead = true;
    }

    pub fn record_monitor_recovered(&self) {
        let mut inner = self.lock();
        inner.monitor_failures = 0;
        inner.monitor_dead = false;
    }

    /// Append a content-free diagnostic line: timestamp and event kind only,
    /// never typed characters.
    pub fn diagnostic(&self, line: &str) {
        let mut inner = self.lock();
        let stamped = format!("{} {}", Local::now().format("%H:%M:%S"), line);
        info!("{}", line);
        if inner.diagnostics.len() >= DIAGNOSTIC_CAPACITY {
            inner.diagnostics.pop_front();
        }
        inner.diagnostics.push_back(stamped);
    }

    /// Recent diagnostic lines, oldest first.
    pub fn recent_diagnostics(&self) -> Vec<String> {
        self.lock().diagnostics.iter().cloned().collect()
    }

    /// Map the current inputs to a presentation state and reason.
    pub fn current(&self, pause: &PauseCoordinator) -> StatusInfo {
        let inner = self.lock();
        let (state, reason) = map_state(&inner, pause);
        StatusInfo {
            state,
            reason: reason.to_string(),
        }
    }

    /// Recompute the mapped state and present it if it changed.
    pub fn refresh(&self, pause: &PauseCoordinator) {
        let (state, reason) = {
            let mut inner = self.lock();
            let (state, reason) = map_state(&inner, pause);
            if inner.last_presented == Some(state) {
                return;
            }
            inner.last_presented = Some(state);
            (state, reason)
        };
        if let Some(sink) = self.lock_sink().as_ref() {
            sink.present(state, &reason);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn StatusSink>>> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn map_state(inner: &StatusInner, pause: &PauseCoordinator) -> (PresentationState, String) {
    let heartbeat_stale = inner
        .last_heartbeat
        .map(|t| t.elapsed() > HEARTBEAT_STALE_AFTER)
        .unwrap_or(false);

    if inner.monitor_dead || heartbeat_stale {
        return (
            PresentationState::Error,
            "Keystroke monitor is not responding".to_string(),
        );
    }
    if inner.monitor_failures > 0 {
        return (
            PresentationState::Warning,
            "Keystroke monitor restarting".to_string(),
        );
    }
    if !pause.permission_granted() {
        return (
            PresentationState::Warning,
            PauseReason::PermissionMissing.describe().to_string(),
        );
    }
    if pause.is_paused() {
        return (PresentationState::Paused, pause.reason().describe().to_string());
    }
    (PresentationState::Active, PauseReason::NotPaused.describe().to_string())
}
