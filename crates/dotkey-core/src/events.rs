use serde::{Deserialize, Serialize};

use crate::pause::PauseStateInfo;

/// Normalized unit emitted by the keystroke monitor. This is the closed set
/// the engine loop consumes; platform adapters produce nothing else.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A printable character.
    Key(char),
    /// A token-terminating character: whitespace, return, or punctuation.
    Delimiter(char),
    Backspace,
    CursorMoved,
    FocusChanged,
    /// Secure input context entered (true) or left (false).
    SecureInput(bool),
    Heartbeat,
    Shutdown,
}

/// Classification of a decoded character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyClass {
    Printable(char),
    Delimiter(char),
}

/// Classify a decoded character as printable or delimiter.
///
/// Punctuation counts as a delimiter, which includes the sentinel itself:
/// `.a.sig ` terminates the `.a` token at the second period and starts a
/// fresh one.
pub fn classify_key(c: char) -> KeyClass {
    if c.is_whitespace() || c.is_ascii_punctuation() {
        KeyClass::Delimiter(c)
    } else {
        KeyClass::Printable(c)
    }
}

/// Outbound events consumed by the status surface and the UI layer.
///
/// Payloads are content-free: counts, flags, and reasons, never typed
/// characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    PauseStateChanged(PauseStateInfo),
    SecureInputDetected { detected: bool },
    PermissionStateChanged { granted: bool },
    EngineHeartbeat { events_seen: usize },
    ExpansionBlocked { reason: String },
}
