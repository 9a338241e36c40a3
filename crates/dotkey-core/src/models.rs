use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::{
    MAX_COMMAND_LEN, MAX_REPLACEMENT_LEN, MAX_REPLACEMENT_LINES, SENTINEL_CHAR,
};
use crate::error::{DotkeyError, Result};

/// Command bodies that are reserved for the application itself and can never
/// be bound to an expansion.
pub const RESERVED_WORDS: &[&str] = &["help", "pause", "resume", "quit", "exit", "settings"];

/// A single command → replacement binding, handed to the engine as part of an
/// immutable snapshot. The engine never mutates rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExpansionRule {
    pub id: String,
    pub command: String,
    pub replacement_text: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ExpansionRule {
    pub fn new(id: String, command: String, replacement_text: String) -> Self {
        let now = Local::now().to_rfc3339();
        Self {
            id,
            command,
            replacement_text,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Lookup key: commands are matched case-insensitively.
    pub fn normalized_command(&self) -> String {
        self.command.to_lowercase()
    }
}

/// Validate a command string (sentinel included).
///
/// Commands must start with the sentinel, the body is `[A-Za-z0-9_]` with no
/// leading, trailing, or doubled underscore, the whole command is at most
/// `MAX_COMMAND_LEN` characters, and the body must not be a reserved word.
pub fn validate_command(command: &str) -> Result<()> {
    let mut chars = command.chars();
    match chars.next() {
        Some(c) if c == SENTINEL_CHAR => {}
        _ => {
            return Err(DotkeyError::InvalidConfig(format!(
                "command must start with '{}'",
                SENTINEL_CHAR
            )))
        }
    }

    let body: &str = &command[SENTINEL_CHAR.len_utf8()..];
    if body.is_empty() {
        return Err(DotkeyError::InvalidConfig(
            "command body must not be empty".to_string(),
        ));
    }
    if command.chars().count() > MAX_COMMAND_LEN {
        return Err(DotkeyError::InvalidConfig(format!(
            "command exceeds {} characters",
            MAX_COMMAND_LEN
        )));
    }
    if !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DotkeyError::InvalidConfig(
            "command may only contain letters, digits, and underscores".to_string(),
        ));
    }
    if body.starts_with('_') || body.ends_with('_') || body.contains("__") {
        return Err(DotkeyError::InvalidConfig(
            "command may not have a leading, trailing, or doubled underscore".to_string(),
        ));
    }
    if RESERVED_WORDS
        .iter()
        .any(|w| w.eq_ignore_ascii_case(body))
    {
        return Err(DotkeyError::InvalidConfig(format!(
            "'{}' is a reserved command",
            body
        )));
    }

    Ok(())
}

/// Validate a replacement text: non-empty, bounded in size and line count.
pub fn validate_replacement(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(DotkeyError::InvalidConfig(
            "replacement text must not be empty".to_string(),
        ));
    }
    if text.chars().count() > MAX_REPLACEMENT_LEN {
        return Err(DotkeyError::InvalidConfig(format!(
            "replacement text exceeds {} characters",
            MAX_REPLACEMENT_LEN
        )));
    }
    if text.lines().count() > MAX_REPLACEMENT_LINES {
        return Err(DotkeyError::InvalidConfig(format!(
            "replacement text exceeds {} lines",
            MAX_REPLACEMENT_LINES
        )));
    }
    Ok(())
}
