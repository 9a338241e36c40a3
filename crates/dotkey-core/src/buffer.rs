use crate::config::{MAX_COMMAND_LEN, SENTINEL_CHAR};

/// What the engine should do after feeding a delimiter to the buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferAction {
    /// Nothing was accumulating.
    None,
    /// A token completed; look it up against the rule table.
    Lookup(String),
}

/// Accumulates typed characters since the last delimiter or reset.
///
/// Two states: Idle (empty) and Accumulating (sentinel followed by body
/// characters). The buffer never exceeds the maximum command length plus the
/// sentinel; pathological input resets rather than grows. A generation
/// counter is bumped on every reset so that any work queued against an older
/// buffer state can be recognized as stale.
#[derive(Debug, Default)]
pub struct MatchBuffer {
    chars: String,
    generation: u64,
}

/// One more than the longest possible command, so a too-long token is
/// distinguishable from an exact-length one before it resets.
const CAPACITY: usize = MAX_COMMAND_LEN + 1;

impl MatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_accumulating(&self) -> bool {
        !self.chars.is_empty()
    }

    /// The partial token accumulated so far, sentinel included.
    pub fn token(&self) -> &str {
        &self.chars
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Feed a printable (non-delimiter) character.
    ///
    /// Idle ignores everything but a sentinel, which arrives through
    /// [`MatchBuffer::on_delimiter`] since the sentinel is punctuation. While
    /// accumulating, a character outside `[A-Za-z0-9_]` or past the length
    /// cap resets the buffer.
    pub fn push(&mut self, c: char) {
        if !self.is_accumulating() {
            return;
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            self.reset();
            return;
        }
        if self.chars.chars().count() >= CAPACITY {
            self.reset();
            return;
        }
        self.chars.push(c);
    }

    /// Feed a delimiter character.
    ///
    /// Completes the current token for lookup, if any. The delimiter itself
    /// is never retained; a sentinel delimiter immediately opens a fresh
    /// accumulation so `.a.sig ` can still match `.sig`.
    pub fn on_delimiter(&mut self, c: char) -> BufferAction {
        let action = if self.is_accumulating() {
            let token = std::mem::take(&mut self.chars);
            self.generation = self.generation.wrapping_add(1);
            BufferAction::Lookup(token)
        } else {
            BufferAction::None
        };

        if c == SENTINEL_CHAR {
            self.chars.push(SENTINEL_CHAR);
        }

        action
    }

    /// Remove the last buffered character; a no-op when idle.
    pub fn backspace(&mut self) {
        self.chars.pop();
    }

    /// Drop any partial token. Used on focus change, cursor movement, pause,
    /// and secure-input transitions.
    pub fn reset(&mut self) {
        if !self.chars.is_empty() {
            self.chars.clear();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(buf: &mut MatchBuffer, s: &str) -> Vec<BufferAction> {
        let mut actions = Vec::new();
        for c in s.chars() {
            match crate::events::classify_key(c) {
                crate::events::KeyClass::Printable(c) => buf.push(c),
                crate::events::KeyClass::Delimiter(c) => actions.push(buf.on_delimiter(c)),
            }
        }
        actions
    }

    #[test]
    fn idle_ignores_plain_characters() {
        let mut buf = MatchBuffer::new();
        buf.push('a');
        buf.push('b');
        assert!(!buf.is_accumulating());
    }

    #[test]
    fn sentinel_opens_accumulation() {
        let mut buf = MatchBuffer::new();
        assert_eq!(buf.on_delimiter('.'), BufferAction::None);
        assert!(buf.is_accumulating());
        buf.push('s');
        buf.push('i');
        buf.push('g');
        assert_eq!(buf.token(), ".sig");
    }

    #[test]
    fn delimiter_completes_token() {
        let mut buf = MatchBuffer::new();
        let actions = type_str(&mut buf, ".sig ");
        assert_eq!(actions.last(), Some(&BufferAction::Lookup(".sig".to_string())));
        assert!(!buf.is_accumulating());
    }

    #[test]
    fn sentinel_delimiter_reopens_accumulation() {
        let mut buf = MatchBuffer::new();
        let actions = type_str(&mut buf, ".a.sig ");
        assert_eq!(
            actions,
            vec![
                BufferAction::None,
                BufferAction::Lookup(".a".to_string()),
                BufferAction::Lookup(".sig".to_string()),
            ]
        );
    }

    #[test]
    fn invalid_character_resets() {
        let mut buf = MatchBuffer::new();
        type_str(&mut buf, ".si");
        let gen = buf.generation();
        buf.push('é');
        assert!(!buf.is_accumulating());
        assert_ne!(buf.generation(), gen);
    }

    #[test]
    fn overflow_resets_instead_of_growing() {
        let mut buf = MatchBuffer::new();
        buf.on_delimiter('.');
        for _ in 0..(CAPACITY - 1) {
            buf.push('a');
        }
        assert!(buf.is_accumulating());
        buf.push('a');
        assert!(!buf.is_accumulating());
    }

    #[test]
    fn backspace_shrinks_then_idles() {
        let mut buf = MatchBuffer::new();
        type_str(&mut buf, ".si");
        buf.backspace();
        assert_eq!(buf.token(), ".s");
        buf.backspace();
        buf.backspace();
        assert!(!buf.is_accumulating());
        // no-op when already idle
        buf.backspace();
        assert!(!buf.is_accumulating());
    }

    #[test]
    fn reset_bumps_generation() {
        let mut buf = MatchBuffer::new();
        let gen = buf.generation();
        buf.reset();
        assert_ne!(buf.generation(), gen);
    }
}
