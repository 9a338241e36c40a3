use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dotkey_core::buffer::{BufferAction, MatchBuffer};
use dotkey_core::events::{EngineEvent, InputEvent};
use dotkey_core::guard::SyntheticInputGuard;
use dotkey_core::models::ExpansionRule;
use dotkey_core::pause::{PauseCoordinator, PauseStateInfo};
use dotkey_core::rules::RuleTable;
use dotkey_core::Result;
use tracing::{debug, info};

use crate::backend::{InputBackend, TextInjector};
use crate::injector;
use crate::permissions;
use crate::status::{StatusInfo, StatusSurface};

/// Engine toggles exposed over the command surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub verbose: bool,
    pub dry_run: bool,
}

/// Fan-out of engine events to any number of subscribers. Disconnected
/// receivers are pruned on the next emit.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: EngineEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<EngineEvent>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The expansion engine: one explicitly-owned state object with a
/// `start`/`stop` lifecycle, reached only through its command surface.
///
/// Stopped means the monitor is not attached; paused means attached but
/// inert. The two are orthogonal, and `stop` never touches persisted pause
/// intent.
pub struct Engine {
    rules: Mutex<Arc<RuleTable>>,
    pause: Arc<PauseCoordinator>,
    status: Arc<StatusSurface>,
    guard: SyntheticInputGuard,
    options: Mutex<EngineOptions>,
    bus: EventBus,
    events_seen: AtomicUsize,
    expansions: AtomicUsize,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        pause: Arc<PauseCoordinator>,
        status: Arc<StatusSurface>,
        guard: SyntheticInputGuard,
    ) -> Self {
        Self {
            rules: Mutex::new(Arc::new(RuleTable::default())),
            pause,
            status,
            guard,
            options: Mutex::new(EngineOptions::default()),
            bus: EventBus::default(),
            events_seen: AtomicUsize::new(0),
            expansions: AtomicUsize::new(0),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Atomically replace the active rule table.
    pub fn load_rules(&self, rules: Vec<ExpansionRule>) {
        let table = Arc::new(RuleTable::build(rules));
        let count = table.len();
        *lock(&self.rules) = table;
        info!(rules = count, "rule table replaced");
        self.status.diagnostic(&format!("rules loaded: {}", count));
    }

    pub fn rules_loaded(&self) -> usize {
        lock(&self.rules).len()
    }

    pub fn set_options(&self, verbose: Option<bool>, dry_run: Option<bool>) {
        let mut options = lock(&self.options);
        if let Some(v) = verbose {
            options.verbose = v;
        }
        if let Some(d) = dry_run {
            options.dry_run = d;
        }
        info!(verbose = options.verbose, dry_run = options.dry_run, "engine options updated");
    }

    pub fn options(&self) -> EngineOptions {
        *lock(&self.options)
    }

    /// Attach the monitor and start consuming events. Idempotent.
    pub fn start(
        self: &Arc<Self>,
        backend: Box<dyn InputBackend>,
        injector: Box<dyn TextInjector>,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let engine = Arc::clone(self);
        let handle = thread::spawn(move || run_loop(engine, backend, injector));
        *lock(&self.worker) = Some(handle);

        self.status.diagnostic("engine started");
        self.status.refresh(&self.pause);
        Ok(())
    }

    /// Detach the monitor. Persisted pause intent is left untouched.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
        self.status.diagnostic("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the user pause flag; returns the new effective pause state.
    pub fn toggle_pause(&self) -> bool {
        let paused = self.pause.toggle_user_pause();
        self.publish_pause_change();
        paused
    }

    pub fn set_pause(&self, paused: bool, by_user: bool) {
        let changed = if by_user {
            self.pause.set_user_pause(paused)
        } else {
            self.pause.set_secure_input(paused)
        };
        if changed {
            self.publish_pause_change();
        }
    }

    pub fn pause_state(&self) -> PauseStateInfo {
        self.pause.snapshot()
    }

    /// Silent permission probe; routes the result through the coordinator so
    /// a revocation pauses the engine instead of crashing it.
    pub fn check_permission(&self) -> bool {
        let granted = permissions::check_permission();
        if self.pause.set_permission_granted(granted) {
            self.bus.emit(EngineEvent::PermissionStateChanged { granted });
            self.publish_pause_change();
        }
        granted
    }

    /// Trigger the OS permission dialog, then re-probe.
    pub fn prompt_permission(&self) -> bool {
        permissions::prompt_permission();
        self.check_permission()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn status_info(&self) -> StatusInfo {
        self.status.current(&self.pause)
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.status.recent_diagnostics()
    }

    pub fn expansion_count(&self) -> usize {
        self.expansions.load(Ordering::SeqCst)
    }

    /// Apply a pause file written by another process (the CLI). Called from
    /// the daemon's poll loop.
    pub fn sync_pause_from_disk(&self) {
        if self.pause.sync_from_disk() {
            self.publish_pause_change();
        }
    }

    fn publish_pause_change(&self) {
        let snapshot = self.pause.snapshot();
        self.status
            .diagnostic(&format!("pause state: {}", self.pause.reason().describe()));
        self.bus.emit(EngineEvent::PauseStateChanged(snapshot));
        self.status.refresh(&self.pause);
    }

    fn rules_snapshot(&self) -> Arc<RuleTable> {
        Arc::clone(&lock(&self.rules))
    }

    /// Process one normalized input event. Returns false on shutdown.
    fn handle_event(
        &self,
        event: InputEvent,
        buffer: &mut MatchBuffer,
        injector: &mut dyn TextInjector,
    ) -> bool {
        match event {
            InputEvent::Shutdown => return false,
            InputEvent::Heartbeat => {
                self.status.record_heartbeat();
                self.bus.emit(EngineEvent::EngineHeartbeat {
                    events_seen: self.events_seen.load(Ordering::SeqCst),
                });
                self.status.refresh(&self.pause);
                return true;
            }
            InputEvent::SecureInput(detected) => {
                // Secure transitions are honored even while paused so the
                // automatic pause lifts when the field is left.
                buffer.reset();
                let changed = self.pause.set_secure_input(detected);
                self.bus.emit(EngineEvent::SecureInputDetected { detected });
                if changed {
                    self.publish_pause_change();
                }
                return true;
            }
            _ => {}
        }

        // Synthetic echoes bypass the matcher entirely; the backend already
        // filters them, this is the engine-side half of the same invariant.
        if self.guard.is_raised() {
            return true;
        }

        // The pause check is the first predicate on the physical-event path:
        // disabling takes effect for the very next keystroke.
        if self.pause.is_paused() {
            buffer.reset();
            return true;
        }

        self.events_seen.fetch_add(1, Ordering::SeqCst);
        if self.options().verbose {
            debug!(kind = event_kind(&event), "input event");
        }

        match event {
            InputEvent::Key(c) => buffer.push(c),
            InputEvent::Backspace => buffer.backspace(),
            InputEvent::CursorMoved | InputEvent::FocusChanged => buffer.reset(),
            InputEvent::Delimiter(c) => {
                if let BufferAction::Lookup(token) = buffer.on_delimiter(c) {
                    self.try_expand(&token, c, injector);
                }
            }
            InputEvent::Heartbeat
            | InputEvent::SecureInput(_)
            | InputEvent::Shutdown => {}
        }
        true
    }

    fn try_expand(&self, token: &str, delimiter: char, injector: &mut dyn TextInjector) {
        let table = self.rules_snapshot();
        let Some(rule) = table.lookup(token) else {
            return;
        };

        let token_len = token.chars().count();
        let dry_run = self.options().dry_run;
        match injector::expand(injector, &self.guard, rule, token_len, delimiter, dry_run) {
            Ok(()) => {
                self.expansions.fetch_add(1, Ordering::SeqCst);
                self.status.diagnostic("expansion completed");
            }
            Err(e) => {
                // The target refused synthetic input, or a secure field was
                // detected only now. No expansion this time; visible text is
                // left as close to untouched as the failure allowed.
                self.status.diagnostic("expansion blocked");
                self.bus.emit(EngineEvent::ExpansionBlocked {
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Diagnostic-safe event kind; never carries the typed character.
fn event_kind(event: &InputEvent) -> &'static str {
    match event {
        InputEvent::Key(_) => "key",
        InputEvent::Delimiter(_) => "delimiter",
        InputEvent::Backspace => "backspace",
        InputEvent::CursorMoved => "cursor-moved",
        InputEvent::FocusChanged => "focus-changed",
        InputEvent::SecureInput(_) => "secure-input",
        InputEvent::Heartbeat => "heartbeat",
        InputEvent::Shutdown => "shutdown",
    }
}

fn run_loop(engine: Arc<Engine>, mut backend: Box<dyn InputBackend>, mut injector: Box<dyn TextInjector>) {
    let mut buffer = MatchBuffer::new();

    while engine.running.load(Ordering::SeqCst) {
        match backend.next_event() {
            Ok(Some(event)) => {
                if !engine.handle_event(event, &mut buffer, injector.as_mut()) {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                engine.status.record_monitor_death();
                engine.status.diagnostic(&format!("monitor stream lost: {}", e));
                engine.status.refresh(&engine.pause);
                break;
            }
        }
    }
    engine.running.store(false, Ordering::SeqCst);
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
