use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide flag raised for the duration of synthetic input.
///
/// Any event the monitor observes while the guard is raised bypasses the
/// buffer and matcher entirely, so a synthesized replacement can never
/// re-trigger an expansion. The count nests: the guard stays raised until the
/// last token is dropped.
#[derive(Debug, Default, Clone)]
pub struct SyntheticInputGuard {
    raised: Arc<AtomicUsize>,
}

impl SyntheticInputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst) > 0
    }

    /// Raise the guard for the lifetime of the returned token.
    #[must_use = "the guard lowers as soon as the token is dropped"]
    pub fn raise(&self) -> GuardToken {
        self.raised.fetch_add(1, Ordering::SeqCst);
        GuardToken {
            raised: Arc::clone(&self.raised),
        }
    }
}

/// RAII token lowering the guard on drop.
#[derive(Debug)]
pub struct GuardToken {
    raised: Arc<AtomicUsize>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.raised.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_and_lower() {
        let guard = SyntheticInputGuard::new();
        assert!(!guard.is_raised());
        {
            let _token = guard.raise();
            assert!(guard.is_raised());
        }
        assert!(!guard.is_raised());
    }

    #[test]
    fn nested_raises_compose() {
        let guard = SyntheticInputGuard::new();
        let outer = guard.raise();
        {
            let _inner = guard.raise();
            assert!(guard.is_raised());
        }
        assert!(guard.is_raised());
        drop(outer);
        assert!(!guard.is_raised());
    }

    #[test]
    fn clones_share_state() {
        let guard = SyntheticInputGuard::new();
        let other = guard.clone();
        let _token = guard.raise();
        assert!(other.is_raised());
    }
}
