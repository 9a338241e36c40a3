use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dotkey_core::events::{classify_key, InputEvent, KeyClass};
use dotkey_core::guard::SyntheticInputGuard;
use dotkey_core::pause::PauseCoordinator;
use dotkey_core::{DotkeyError, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use rdev::{EventType, Key as RdevKey};
use tracing::{debug, warn};

use crate::permissions;
use crate::status::StatusSurface;

/// Narrow interface over the OS global input stream.
///
/// `next_event` blocks up to an internal timeout; `Ok(None)` means "nothing
/// right now", letting the engine loop re-check its running flag. Everything
/// the engine consumes goes through this trait, so the state machine tests
/// against a scripted implementation without a live OS hook.
pub trait InputBackend: Send {
    fn next_event(&mut self) -> Result<Option<InputEvent>>;
}

/// Narrow interface over synthetic input: delete backwards from the cursor
/// and type replacement text.
pub trait TextInjector: Send {
    fn inject_text(&mut self, text: &str) -> Result<()>;
    fn delete_backward(&mut self, count: usize) -> Result<()>;
}

/// How often the timer thread ticks for secure-input polling.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Heartbeat every N poll ticks.
const HEARTBEAT_TICKS: u32 = 3;

/// Maximum consecutive listener failures before the monitor is declared dead.
const MAX_LISTEN_RETRIES: u32 = 5;

/// Production input backend on top of `rdev::listen`.
///
/// A listener thread classifies OS key events into the normalized stream; a
/// low-frequency timer thread feeds heartbeats and secure-input transitions.
/// Events observed while the synthetic-input guard is raised are dropped at
/// the source, before any classification result can reach the buffer.
pub struct RdevBackend {
    rx: Receiver<InputEvent>,
    stop: Arc<AtomicBool>,
}

impl RdevBackend {
    pub fn spawn(
        guard: SyntheticInputGuard,
        pause: Arc<PauseCoordinator>,
        status: Arc<StatusSurface>,
    ) -> Self {
        let (tx, rx) = bounded::<InputEvent>(1024);
        let stop = Arc::new(AtomicBool::new(false));

        spawn_listener(tx.clone(), guard, pause, status);
        spawn_timer(tx, Arc::clone(&stop));

        Self { rx, stop }
    }
}

impl InputBackend for RdevBackend {
    fn next_event(&mut self) -> Result<Option<InputEvent>> {
        match self.rx.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DotkeyError::Monitor("input stream closed".to_string()))
            }
        }
    }
}

impl Drop for RdevBackend {
    fn drop(&mut self) {
        // Stops the timer thread. The rdev listener thread cannot be
        // cancelled once attached; it dies with the process.
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn spawn_listener(
    tx: Sender<InputEvent>,
    guard: SyntheticInputGuard,
    pause: Arc<PauseCoordinator>,
    status: Arc<StatusSurface>,
) {
    thread::spawn(move || {
        // Cleared on a listen failure; the next delivered event proves the
        // tap is healthy again and marks the monitor recovered.
        let healthy = Arc::new(AtomicBool::new(true));

        let callback = {
            let guard = guard.clone();
            let tx = tx.clone();
            let healthy = Arc::clone(&healthy);
            let status = Arc::clone(&status);
            move |event: rdev::Event| {
                note_listener_event(&healthy, &status);
                // Synthetic input must never reach the buffer: the guard
                // check comes before classification.
                if guard.is_raised() {
                    return;
                }
                if let Some(normalized) = classify_rdev_event(&event) {
                    // Dropping on a full queue beats blocking the OS event
                    // delivery thread.
                    let _ = tx.try_send(normalized);
                }
            }
        };

        let mut retries = 0u32;
        let mut backoff = Duration::from_secs(1);

        loop {
            if let Err(e) = rdev::listen(callback.clone()) {
                // Events flowed since the previous failure, so the restart
                // budget starts over; it counts consecutive failures only.
                if healthy.swap(false, Ordering::SeqCst) && retries > 0 {
                    retries = 0;
                    backoff = Duration::from_secs(1);
                }
                retries += 1;
                warn!(retries, "keyboard listener failed: {:?}", e);
                status.record_monitor_failure();

                // A listen failure is usually a revoked permission; re-probe
                // and let the coordinator pause the engine instead of
                // crashing.
                let granted = permissions::check_permission();
                pause.set_permission_granted(granted);

                if retries >= MAX_LISTEN_RETRIES {
                    status.record_monitor_death();
                    warn!(
                        "keyboard listener gave up after {} attempts",
                        MAX_LISTEN_RETRIES
                    );
                    return;
                }

                thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(30));
            } else {
                // listen() blocks for the life of the tap; returning Ok means
                // the stream ended.
                return;
            }
        }
    });
}

/// Called for every event the OS delivers. The first event after a listen
/// failure marks the monitor recovered, clearing the Warning state.
fn note_listener_event(healthy: &AtomicBool, status: &StatusSurface) {
    if !healthy.swap(true, Ordering::SeqCst) {
        status.record_monitor_recovered();
    }
}

fn spawn_timer(tx: Sender<InputEvent>, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut last_secure = false;
        let mut ticks = 0u32;

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let secure = secure_input_active();
            if secure != last_secure {
                last_secure = secure;
                if tx.send(InputEvent::SecureInput(secure)).is_err() {
                    return;
                }
            }

            ticks += 1;
            if ticks >= HEARTBEAT_TICKS {
                ticks = 0;
                if tx.send(InputEvent::Heartbeat).is_err() {
                    return;
                }
            }
        }
        debug!("monitor timer thread stopped");
    });
}

/// Map an OS event to the normalized stream; `None` ignores it.
fn classify_rdev_event(event: &rdev::Event) -> Option<InputEvent> {
    match event.event_type {
        EventType::KeyPress(key) => match key {
            RdevKey::Space => Some(InputEvent::Delimiter(' ')),
            RdevKey::Return => Some(InputEvent::Delimiter('\n')),
            RdevKey::Tab => Some(InputEvent::Delimiter('\t')),
            RdevKey::Backspace => Some(InputEvent::Backspace),
            RdevKey::LeftArrow
            | RdevKey::RightArrow
            | RdevKey::UpArrow
            | RdevKey::DownArrow
            | RdevKey::Home
            | RdevKey::End
            | RdevKey::PageUp
            | RdevKey::PageDown => Some(InputEvent::CursorMoved),
            _ => rdev_key_to_char(&key, event).map(|c| match classify_key(c) {
                KeyClass::Printable(c) => InputEvent::Key(c),
                KeyClass::Delimiter(c) => InputEvent::Delimiter(c),
            }),
        },
        // A mouse press moves the caret somewhere else.
        EventType::ButtonPress(_) => Some(InputEvent::FocusChanged),
        _ => None,
    }
}

/// Decode the typed character from an rdev key event.
///
/// Shifted punctuation reports the base key with the shifted character in
/// `event.name`, so the name is authoritative when present.
fn rdev_key_to_char(key: &RdevKey, event: &rdev::Event) -> Option<char> {
    if let Some(name) = &event.name {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return Some(c);
            }
        }
    }

    // Fallback for layouts that omit the name on punctuation keys.
    match key {
        RdevKey::Dot => Some('.'),
        RdevKey::Comma => Some(','),
        RdevKey::SemiColon => Some(';'),
        RdevKey::Slash => Some('/'),
        RdevKey::BackSlash => Some('\\'),
        RdevKey::Quote => Some('\''),
        RdevKey::Minus => Some('-'),
        RdevKey::Equal => Some('='),
        _ => None,
    }
}

/// Best-effort secure input probe.
///
/// On macOS this asks the OS whether any process holds secure event input
/// (password fields set this). Elsewhere there is no equivalent signal, so
/// detection degrades to manual pause only.
#[cfg(target_os = "macos")]
pub fn secure_input_active() -> bool {
    #[link(name = "Carbon", kind = "framework")]
    extern "C" {
        fn IsSecureEventInputEnabled() -> bool;
    }
    unsafe { IsSecureEventInputEnabled() }
}

#[cfg(not(target_os = "macos"))]
pub fn secure_input_active() -> bool {
    false
}

/// Synthetic-input adapter over enigo.
pub struct EnigoInjector {
    enigo: Enigo,
}

/// Long lines are injected in chunks so the keyboard buffer is never
/// overwhelmed.
const CHUNK_SIZE: usize = 512;

impl EnigoInjector {
    pub fn new() -> Result<Self> {
        let settings = Settings::default();
        match Enigo::new(&settings) {
            Ok(enigo) => Ok(Self { enigo }),
            Err(err) => Err(DotkeyError::Injector(format!(
                "failed to create keyboard controller: {}",
                err
            ))),
        }
    }
}

impl TextInjector for EnigoInjector {
    fn inject_text(&mut self, text: &str) -> Result<()> {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.enigo
                    .key(Key::Return, Direction::Click)
                    .map_err(|err| {
                        DotkeyError::Injector(format!("failed to type newline: {}", err))
                    })?;
                // Let the newline register before the next line starts.
                thread::sleep(Duration::from_millis(15));
            }

            if line.len() > CHUNK_SIZE {
                for chunk in line.chars().collect::<Vec<_>>().chunks(CHUNK_SIZE) {
                    let chunk_str: String = chunk.iter().collect();
                    self.enigo.text(&chunk_str).map_err(|err| {
                        DotkeyError::Injector(format!("failed to type text: {}", err))
                    })?;
                    thread::sleep(Duration::from_millis(20));
                }
            } else if !line.is_empty() {
                self.enigo.text(line).map_err(|err| {
                    DotkeyError::Injector(format!("failed to type text: {}", err))
                })?;
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn delete_backward(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            thread::sleep(Duration::from_millis(2));
            self.enigo
                .key(Key::Backspace, Direction::Click)
                .map_err(|err| {
                    DotkeyError::Injector(format!("failed to send backspace: {}", err))
                })?;
        }
        Ok(())
    }
}
