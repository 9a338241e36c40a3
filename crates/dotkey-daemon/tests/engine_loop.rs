//! End-to-end tests of the engine event loop against a scripted input
//! backend and a recording injector, with a string standing in for the
//! target application's text field.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dotkey_core::events::{classify_key, EngineEvent, InputEvent, KeyClass};
use dotkey_core::guard::SyntheticInputGuard;
use dotkey_core::models::ExpansionRule;
use dotkey_core::pause::PauseCoordinator;
use dotkey_core::{DotkeyError, Result};
use dotkey_daemon::engine::Engine;
use dotkey_daemon::status::StatusSurface;
use dotkey_daemon::{InputBackend, TextInjector};

/// Scripted backend. Each delivered event first has its physical effect
/// applied to the shared document, the way the OS inserts a character before
/// the tap observes it.
struct FakeBackend {
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
    doc: Arc<Mutex<String>>,
}

impl InputBackend for FakeBackend {
    fn next_event(&mut self) -> Result<Option<InputEvent>> {
        let event = self.queue.lock().unwrap().pop_front();
        match event {
            Some(event) => {
                let mut doc = self.doc.lock().unwrap();
                match event {
                    InputEvent::Key(c) | InputEvent::Delimiter(c) => doc.push(c),
                    InputEvent::Backspace => {
                        doc.pop();
                    }
                    _ => {}
                }
                Ok(Some(event))
            }
            None => {
                thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }
}

/// Recording injector operating on the shared document. If the guard is not
/// raised at injection time, the injected characters are echoed back into the
/// event queue the way a live tap would observe them; with correct guard
/// ordering the echo never happens.
struct FakeInjector {
    doc: Arc<Mutex<String>>,
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
    guard: SyntheticInputGuard,
    ops: Arc<Mutex<Vec<String>>>,
    fail_on_inject: bool,
}

impl TextInjector for FakeInjector {
    fn inject_text(&mut self, text: &str) -> Result<()> {
        if self.fail_on_inject {
            return Err(DotkeyError::Injector("target refused input".to_string()));
        }
        self.ops.lock().unwrap().push(format!("inject:{}", text));
        self.doc.lock().unwrap().push_str(text);
        if !self.guard.is_raised() {
            let mut queue = self.queue.lock().unwrap();
            for c in text.chars() {
                queue.push_back(match classify_key(c) {
                    KeyClass::Printable(c) => InputEvent::Key(c),
                    KeyClass::Delimiter(c) => InputEvent::Delimiter(c),
                });
            }
        }
        Ok(())
    }

    fn delete_backward(&mut self, count: usize) -> Result<()> {
        self.ops.lock().unwrap().push(format!("delete:{}", count));
        let mut doc = self.doc.lock().unwrap();
        for _ in 0..count {
            doc.pop();
        }
        Ok(())
    }
}

struct Harness {
    engine: Arc<Engine>,
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
    doc: Arc<Mutex<String>>,
    ops: Arc<Mutex<Vec<String>>>,
    guard: SyntheticInputGuard,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(rules: Vec<ExpansionRule>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pause = Arc::new(PauseCoordinator::load(dir.path().join("pause.json")));
        let status = Arc::new(StatusSurface::new());
        let guard = SyntheticInputGuard::new();
        let engine = Arc::new(Engine::new(pause, status, guard.clone()));
        engine.load_rules(rules);

        Self {
            engine,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            doc: Arc::new(Mutex::new(String::new())),
            ops: Arc::new(Mutex::new(Vec::new())),
            guard,
            _dir: dir,
        }
    }

    fn type_str(&self, s: &str) {
        let mut queue = self.queue.lock().unwrap();
        for c in s.chars() {
            queue.push_back(match classify_key(c) {
                KeyClass::Printable(c) => InputEvent::Key(c),
                KeyClass::Delimiter(c) => InputEvent::Delimiter(c),
            });
        }
    }

    fn feed(&self, event: InputEvent) {
        self.queue.lock().unwrap().push_back(event);
    }

    /// Run the queued script to completion and detach.
    fn run(&self) {
        self.run_with_failing_injector(false);
    }

    fn run_with_failing_injector(&self, fail_on_inject: bool) {
        self.feed(InputEvent::Shutdown);
        let backend = FakeBackend {
            queue: Arc::clone(&self.queue),
            doc: Arc::clone(&self.doc),
        };
        let injector = FakeInjector {
            doc: Arc::clone(&self.doc),
            queue: Arc::clone(&self.queue),
            guard: self.guard.clone(),
            ops: Arc::clone(&self.ops),
            fail_on_inject,
        };
        self.engine
            .start(Box::new(backend), Box::new(injector))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while self.engine.is_running() {
            assert!(Instant::now() < deadline, "engine loop did not finish");
            thread::sleep(Duration::from_millis(2));
        }
        self.engine.stop();
    }

    fn doc(&self) -> String {
        self.doc.lock().unwrap().clone()
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

fn sig_rule() -> ExpansionRule {
    ExpansionRule::new(
        "1".to_string(),
        ".sig".to_string(),
        "Best,\nName".to_string(),
    )
}

#[test]
fn typing_a_command_expands_in_place() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".sig ");
    h.run();

    assert_eq!(h.doc(), "Best,\nName ");
    assert_eq!(h.engine.expansion_count(), 1);
    // token and the typed delimiter deleted, replacement and delimiter typed
    assert_eq!(
        h.ops(),
        vec!["delete:5", "inject:Best,\nName", "inject: "]
    );
}

#[test]
fn superstring_of_a_command_does_not_expand() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".signature ");
    h.run();

    assert_eq!(h.doc(), ".signature ");
    assert_eq!(h.engine.expansion_count(), 0);
    assert!(h.ops().is_empty());
}

#[test]
fn prefix_without_delimiter_never_fires() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".sig");
    h.run();

    assert_eq!(h.doc(), ".sig");
    assert_eq!(h.engine.expansion_count(), 0);
}

#[test]
fn matching_is_case_insensitive() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".SIG ");
    h.run();

    assert_eq!(h.doc(), "Best,\nName ");
}

#[test]
fn replay_of_the_same_stream_is_deterministic() {
    let script = ".sig hello .sig\n.signature .sig\t";
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let h = Harness::new(vec![sig_rule()]);
        h.type_str(script);
        h.run();
        outcomes.push((h.doc(), h.engine.expansion_count(), h.ops()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[1], outcomes[2]);
}

#[test]
fn a_second_sentinel_restarts_the_token() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".a.sig ");
    h.run();

    // `.a` found no rule; `.sig` still matched
    assert_eq!(h.doc(), ".aBest,\nName ");
    assert_eq!(h.engine.expansion_count(), 1);
}

#[test]
fn backspace_edits_the_pending_token() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".six");
    h.feed(InputEvent::Backspace);
    h.type_str("g ");
    h.run();

    assert_eq!(h.doc(), "Best,\nName ");
}

#[test]
fn cursor_movement_abandons_the_token() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".sig");
    h.feed(InputEvent::CursorMoved);
    h.type_str(" ");
    h.run();

    assert_eq!(h.doc(), ".sig ");
    assert_eq!(h.engine.expansion_count(), 0);
}

#[test]
fn user_pause_suppresses_expansion() {
    let h = Harness::new(vec![sig_rule()]);
    h.engine.set_pause(true, true);
    h.type_str(".sig ");
    h.run();

    assert_eq!(h.doc(), ".sig ");
    assert_eq!(h.engine.expansion_count(), 0);
}

#[test]
fn toggle_pause_reports_the_new_state() {
    let h = Harness::new(vec![sig_rule()]);
    assert!(h.engine.toggle_pause());
    assert!(h.engine.pause_state().paused_by_user);
    assert!(!h.engine.toggle_pause());
}

#[test]
fn secure_input_mid_token_resets_and_auto_resumes() {
    let h = Harness::new(vec![sig_rule()]);
    h.type_str(".si");
    h.feed(InputEvent::SecureInput(true));
    // typed inside the password field, must not match
    h.type_str("g ");
    h.feed(InputEvent::SecureInput(false));
    // back in a normal field the engine is active again
    h.type_str(".sig ");
    h.run();

    assert_eq!(h.doc(), ".sig Best,\nName ");
    assert_eq!(h.engine.expansion_count(), 1);
    let state = h.engine.pause_state();
    assert!(!state.is_paused);
    assert!(!state.paused_by_secure_input);
}

#[test]
fn secure_input_pause_does_not_clear_user_pause() {
    let h = Harness::new(vec![sig_rule()]);
    h.engine.set_pause(true, true);
    h.feed(InputEvent::SecureInput(true));
    h.feed(InputEvent::SecureInput(false));
    h.run();

    let state = h.engine.pause_state();
    assert!(state.is_paused);
    assert!(state.paused_by_user);
}

#[test]
fn events_while_guard_is_raised_are_ignored() {
    let h = Harness::new(vec![sig_rule()]);
    let token = h.guard.raise();
    h.type_str(".sig ");
    h.run();
    drop(token);

    assert_eq!(h.engine.expansion_count(), 0);
    assert!(h.ops().is_empty());
}

#[test]
fn replacement_containing_a_command_does_not_retrigger() {
    let rule = ExpansionRule::new(
        "1".to_string(),
        ".sig".to_string(),
        "see .sig for details".to_string(),
    );
    let h = Harness::new(vec![rule]);
    h.type_str(".sig ");
    h.run();

    // one expansion, and the injected `.sig ` produced no echo events
    assert_eq!(h.engine.expansion_count(), 1);
    assert_eq!(h.doc(), "see .sig for details ");
}

#[test]
fn dry_run_counts_the_match_but_touches_nothing() {
    let h = Harness::new(vec![sig_rule()]);
    h.engine.set_options(None, Some(true));
    h.type_str(".sig ");
    h.run();

    assert_eq!(h.doc(), ".sig ");
    assert_eq!(h.engine.expansion_count(), 1);
    assert!(h.ops().is_empty());
}

#[test]
fn blocked_injection_reports_and_moves_on() {
    let h = Harness::new(vec![sig_rule()]);
    let events = h.engine.subscribe();
    h.type_str(".sig ");
    h.run_with_failing_injector(true);

    assert_eq!(h.engine.expansion_count(), 0);
    let blocked = events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::ExpansionBlocked { .. }));
    assert!(blocked);
}

#[test]
fn heartbeats_flow_to_subscribers() {
    let h = Harness::new(vec![sig_rule()]);
    let events = h.engine.subscribe();
    h.feed(InputEvent::Heartbeat);
    h.run();

    let heartbeat = events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::EngineHeartbeat { .. }));
    assert!(heartbeat);
}

#[test]
fn pause_events_are_published() {
    let h = Harness::new(vec![sig_rule()]);
    let events = h.engine.subscribe();
    h.engine.set_pause(true, true);

    let changed = events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::PauseStateChanged(info) if info.is_paused));
    assert!(changed);
}

#[test]
fn stop_is_orthogonal_to_pause_intent() {
    let h = Harness::new(vec![sig_rule()]);
    h.engine.set_pause(true, true);
    h.run();
    h.engine.stop();

    assert!(h.engine.pause_state().paused_by_user);
}
