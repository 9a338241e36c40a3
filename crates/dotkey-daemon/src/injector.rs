use std::thread;
use std::time::Duration;

use dotkey_core::guard::SyntheticInputGuard;
use dotkey_core::models::ExpansionRule;
use dotkey_core::Result;
use tracing::debug;

use crate::backend::TextInjector;

/// Replace a matched token with its expansion as one logical operation.
///
/// The guard is raised strictly before the first synthetic event and lowered
/// strictly after the last has had time to flush, so the monitor can never
/// misread an intermediate state as physical input. The typed token
/// (sentinel included) and the already-inserted delimiter are deleted, the
/// replacement is typed, and the delimiter is typed again so it survives the
/// expansion.
///
/// In dry-run mode nothing is deleted or injected; the match is only
/// recorded.
pub fn expand(
    injector: &mut dyn TextInjector,
    guard: &SyntheticInputGuard,
    rule: &ExpansionRule,
    token_len: usize,
    delimiter: char,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        debug!(
            deleted = token_len + 1,
            injected = rule.replacement_text.chars().count(),
            "dry-run: matched, skipping injection"
        );
        return Ok(());
    }

    let _raised = guard.raise();

    injector.delete_backward(token_len + 1)?;
    injector.inject_text(&rule.replacement_text)?;
    injector.inject_text(&delimiter.to_string())?;

    // Give the OS queue a moment to drain before the guard drops.
    thread::sleep(Duration::from_millis(10));
    Ok(())
}
