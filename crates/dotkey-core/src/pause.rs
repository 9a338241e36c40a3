use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Version the persisted pause-state file must carry.
pub const PAUSE_FILE_VERSION: u32 = 1;

/// Why the engine is (or is not) paused, derived from the pause flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PauseReason {
    NotPaused,
    UserRequested,
    SecureInput,
    PermissionMissing,
    Multiple,
}

impl PauseReason {
    /// Human-readable reason for the status surface.
    pub fn describe(&self) -> &'static str {
        match self {
            PauseReason::NotPaused => "Active",
            PauseReason::UserRequested => "Paused by user",
            PauseReason::SecureInput => "Paused while in a secure input field",
            PauseReason::PermissionMissing => "Paused: accessibility permission not granted",
            PauseReason::Multiple => "Paused for multiple reasons",
        }
    }
}

/// The composite pause decision as one pure function of its three inputs.
///
/// Effective pause is always recomputed from the flags, never mutated
/// directly, so no two sources can race into an inconsistent composite.
pub fn effective_pause(
    paused_by_user: bool,
    paused_by_secure_input: bool,
    permission_granted: bool,
) -> (bool, PauseReason) {
    let causes = [paused_by_user, paused_by_secure_input, !permission_granted];
    let reason = match causes.iter().filter(|c| **c).count() {
        0 => PauseReason::NotPaused,
        1 if paused_by_user => PauseReason::UserRequested,
        1 if paused_by_secure_input => PauseReason::SecureInput,
        1 => PauseReason::PermissionMissing,
        _ => PauseReason::Multiple,
    };
    (reason != PauseReason::NotPaused, reason)
}

/// Pause state as exposed over the command surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseStateInfo {
    pub is_paused: bool,
    pub paused_by_user: bool,
    pub paused_by_secure_input: bool,
    pub pause_timestamp: Option<String>,
    /// Only a user-initiated pause can be manually resumed.
    pub can_resume: bool,
}

/// On-disk record. Secure-input pause is transient and never persisted;
/// permission state is re-probed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedPauseState {
    version: u32,
    paused_by_user: bool,
    pause_timestamp: Option<String>,
}

#[derive(Debug)]
struct PauseFlags {
    paused_by_user: bool,
    paused_by_secure_input: bool,
    permission_granted: bool,
    pause_timestamp: Option<String>,
    /// Transition counter; orders persisted records across writer threads.
    seq: u64,
}

/// Single authoritative owner of the pause state.
///
/// Three independent sources feed it: the explicit user toggle, the
/// secure-input signal from the monitor, and the permission probe. Every
/// mutation is serialized through one mutex, every transition of the
/// persisted part is written atomically, and the write happens off the
/// caller's thread so the in-memory change is never delayed by disk I/O.
/// Each record carries the sequence number of the transition that produced
/// it; the writer skips any record older than the newest one already on
/// disk, so rapid transitions always settle on the final state.
#[derive(Debug)]
pub struct PauseCoordinator {
    inner: Mutex<PauseFlags>,
    path: PathBuf,
    /// Sequence number of the newest record written to disk.
    written: Arc<Mutex<u64>>,
}

impl PauseCoordinator {
    /// Restore the coordinator from the persisted file.
    ///
    /// A missing or unreadable file falls back to "not paused" with a logged
    /// warning rather than blocking startup.
    pub fn load(path: PathBuf) -> Self {
        let (paused_by_user, pause_timestamp) = match read_persisted(&path) {
            Ok(Some(p)) => (p.paused_by_user, p.pause_timestamp),
            Ok(None) => (false, None),
            Err(e) => {
                warn!("could not read pause state, defaulting to not paused: {}", e);
                (false, None)
            }
        };

        Self {
            inner: Mutex::new(PauseFlags {
                paused_by_user,
                paused_by_secure_input: false,
                permission_granted: true,
                pause_timestamp,
                seq: 0,
            }),
            path,
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// Explicit user action; always honored immediately. Returns whether the
    /// effective pause state changed.
    pub fn set_user_pause(&self, paused: bool) -> bool {
        let (changed, seq, record) = {
            let mut flags = self.lock();
            let (was_paused, _) = flags.effective();
            flags.paused_by_user = paused;
            flags.stamp();
            let (now_paused, _) = flags.effective();
            (was_paused != now_paused, flags.next_seq(), flags.persisted())
        };
        self.persist_async(seq, record);
        changed
    }

    /// Flip the user pause flag; returns the new effective pause state.
    pub fn toggle_user_pause(&self) -> bool {
        let (seq, record) = {
            let mut flags = self.lock();
            flags.paused_by_user = !flags.paused_by_user;
            flags.stamp();
            (flags.next_seq(), flags.persisted())
        };
        self.persist_async(seq, record);
        self.is_paused()
    }

    /// Automatic signal from the monitor. Never alters the user flag and is
    /// never persisted. Returns whether the effective state changed.
    pub fn set_secure_input(&self, detected: bool) -> bool {
        let mut flags = self.lock();
        let (was_paused, _) = flags.effective();
        flags.paused_by_secure_input = detected;
        flags.stamp();
        let (now_paused, _) = flags.effective();
        was_paused != now_paused
    }

    /// Permission probe result. Revocation forces an effective pause without
    /// touching the stored user intent, so prior intent is restored once
    /// permission returns.
    pub fn set_permission_granted(&self, granted: bool) -> bool {
        let mut flags = self.lock();
        let (was_paused, _) = flags.effective();
        flags.permission_granted = granted;
        flags.stamp();
        let (now_paused, _) = flags.effective();
        was_paused != now_paused
    }

    pub fn is_paused(&self) -> bool {
        self.lock().effective().0
    }

    pub fn reason(&self) -> PauseReason {
        self.lock().effective().1
    }

    pub fn permission_granted(&self) -> bool {
        self.lock().permission_granted
    }

    pub fn snapshot(&self) -> PauseStateInfo {
        let flags = self.lock();
        let (is_paused, _) = flags.effective();
        PauseStateInfo {
            is_paused,
            paused_by_user: flags.paused_by_user,
            paused_by_secure_input: flags.paused_by_secure_input,
            pause_timestamp: flags.pause_timestamp.clone(),
            can_resume: flags.paused_by_user,
        }
    }

    /// Pick up an externally written pause file (the CLI writes it; the
    /// daemon's poll loop applies it). Returns whether the user flag changed.
    pub fn sync_from_disk(&self) -> bool {
        let persisted = match read_persisted(&self.path) {
            Ok(Some(p)) => p,
            _ => return false,
        };
        let mut flags = self.lock();
        if flags.paused_by_user == persisted.paused_by_user {
            return false;
        }
        flags.paused_by_user = persisted.paused_by_user;
        flags.pause_timestamp = persisted.pause_timestamp;
        true
    }

    /// Write the persisted record synchronously. The async path goes through
    /// the same ordered writer; the CLI uses this directly.
    pub fn persist_now(&self) -> Result<()> {
        let (seq, record) = {
            let mut flags = self.lock();
            (flags.next_seq(), flags.persisted())
        };
        write_latest(&self.path, &self.written, seq, &record)
    }

    fn persist_async(&self, seq: u64, record: PersistedPauseState) {
        let path = self.path.clone();
        let written = Arc::clone(&self.written);
        thread::spawn(move || {
            if let Err(e) = write_latest(&path, &written, seq, &record) {
                warn!("failed to persist pause state: {}", e);
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PauseFlags> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PauseFlags {
    fn effective(&self) -> (bool, PauseReason) {
        effective_pause(
            self.paused_by_user,
            self.paused_by_secure_input,
            self.permission_granted,
        )
    }

    /// Keep the timestamp in step with the effective state: stamp when a
    /// pause engages, clear when it fully lifts.
    fn stamp(&mut self) {
        let (paused, _) = self.effective();
        if paused && self.pause_timestamp.is_none() {
            self.pause_timestamp = Some(Local::now().to_rfc3339());
        } else if !paused {
            self.pause_timestamp = None;
        }
    }

    /// Number the transition whose record is about to be captured. Called
    /// under the flags lock, so sequence order is transition order.
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn persisted(&self) -> PersistedPauseState {
        PersistedPauseState {
            version: PAUSE_FILE_VERSION,
            paused_by_user: self.paused_by_user,
            pause_timestamp: if self.paused_by_user {
                self.pause_timestamp.clone()
            } else {
                None
            },
        }
    }
}

fn read_persisted(path: &Path) -> Result<Option<PersistedPauseState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let record: PersistedPauseState = serde_json::from_str(&content)?;
    if record.version != PAUSE_FILE_VERSION {
        warn!(
            found = record.version,
            expected = PAUSE_FILE_VERSION,
            "pause state file version mismatch, ignoring"
        );
        return Ok(None);
    }
    Ok(Some(record))
}

/// Ordered write: writers serialize on the `written` mutex, and a record
/// older than the newest one already on disk is skipped. Without this, two
/// rapid transitions could rename out of order and leave the stale record
/// behind for the daemon's poll loop to read back.
fn write_latest(
    path: &Path,
    written: &Mutex<u64>,
    seq: u64,
    record: &PersistedPauseState,
) -> Result<()> {
    let mut newest = match written.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if seq <= *newest {
        return Ok(());
    }
    write_persisted(path, record)?;
    *newest = seq;
    Ok(())
}

/// Write-temp-then-rename so a crash mid-write can never leave a torn file.
fn write_persisted(path: &Path, record: &PersistedPauseState) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file(), record)?;
    tmp.persist(path)
        .map_err(|e| crate::error::DotkeyError::Persistence(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(dir: &tempfile::TempDir) -> PauseCoordinator {
        PauseCoordinator::load(dir.path().join("pause_state.json"))
    }

    #[test]
    fn effective_pause_is_or_of_sources() {
        for user in [false, true] {
            for secure in [false, true] {
                for granted in [false, true] {
                    let (paused, _) = effective_pause(user, secure, granted);
                    assert_eq!(paused, user || secure || !granted);
                }
            }
        }
    }

    #[test]
    fn reasons_match_single_sources() {
        assert_eq!(effective_pause(false, false, true).1, PauseReason::NotPaused);
        assert_eq!(effective_pause(true, false, true).1, PauseReason::UserRequested);
        assert_eq!(effective_pause(false, true, true).1, PauseReason::SecureInput);
        assert_eq!(
            effective_pause(false, false, false).1,
            PauseReason::PermissionMissing
        );
        assert_eq!(effective_pause(true, true, true).1, PauseReason::Multiple);
    }

    #[test]
    fn toggling_one_source_never_clears_another() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(&dir);

        coord.set_user_pause(true);
        coord.set_secure_input(true);
        coord.set_secure_input(false);
        let info = coord.snapshot();
        assert!(info.paused_by_user);
        assert!(info.is_paused);

        coord.set_secure_input(true);
        coord.set_user_pause(false);
        let info = coord.snapshot();
        assert!(info.paused_by_secure_input);
        assert!(info.is_paused);
        assert!(!info.can_resume);
    }

    #[test]
    fn arbitrary_sequences_keep_the_composite_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(&dir);
        let script = [
            (true, false),
            (true, true),
            (false, true),
            (false, false),
            (true, false),
        ];
        for (u, s) in script {
            coord.set_user_pause(u);
            coord.set_secure_input(s);
            assert_eq!(coord.is_paused(), u || s);
        }
    }

    #[test]
    fn permission_revocation_preserves_user_intent() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(&dir);

        assert!(coord.set_permission_granted(false));
        assert_eq!(coord.reason(), PauseReason::PermissionMissing);
        assert!(!coord.snapshot().paused_by_user);

        assert!(coord.set_permission_granted(true));
        assert!(!coord.is_paused());
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_state.json");

        let coord = PauseCoordinator::load(path.clone());
        coord.set_user_pause(true);
        coord.set_secure_input(true);
        coord.persist_now().unwrap();
        let before = coord.snapshot();
        drop(coord);

        let restored = PauseCoordinator::load(path);
        let after = restored.snapshot();
        assert!(after.is_paused);
        assert!(after.paused_by_user);
        // transient flag is never persisted as true
        assert!(!after.paused_by_secure_input);
        assert_eq!(after.pause_timestamp, before.pause_timestamp);
        assert_eq!(restored.reason(), PauseReason::UserRequested);
    }

    #[test]
    fn rapid_transitions_persist_the_final_state() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_state.json");
        let coord = PauseCoordinator::load(path.clone());

        // Each transition spawns its own writer thread; an out-of-order
        // rename must never leave an earlier record behind.
        for _ in 0..100 {
            coord.set_user_pause(false);
            coord.set_user_pause(true);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Some(p)) = read_persisted(&path) {
                if p.paused_by_user {
                    break;
                }
            }
            assert!(
                Instant::now() < deadline,
                "final transition never reached disk"
            );
            thread::sleep(Duration::from_millis(5));
        }

        // stragglers for earlier transitions must not clobber it
        thread::sleep(Duration::from_millis(100));
        let restored = PauseCoordinator::load(path);
        assert!(restored.snapshot().paused_by_user);
    }

    #[test]
    fn unreadable_file_defaults_to_not_paused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_state.json");
        std::fs::write(&path, "not json at all").unwrap();
        let coord = PauseCoordinator::load(path);
        assert!(!coord.is_paused());
    }

    #[test]
    fn version_mismatch_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_state.json");
        std::fs::write(
            &path,
            r#"{"version": 42, "paused_by_user": true, "pause_timestamp": null}"#,
        )
        .unwrap();
        let coord = PauseCoordinator::load(path);
        assert!(!coord.is_paused());
    }

    #[test]
    fn sync_from_disk_applies_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_state.json");
        let coord = PauseCoordinator::load(path.clone());
        assert!(!coord.is_paused());

        let external = PersistedPauseState {
            version: PAUSE_FILE_VERSION,
            paused_by_user: true,
            pause_timestamp: Some(Local::now().to_rfc3339()),
        };
        write_persisted(&path, &external).unwrap();

        assert!(coord.sync_from_disk());
        assert!(coord.snapshot().paused_by_user);
        // identical state is a no-op
        assert!(!coord.sync_from_disk());
    }

    #[test]
    fn timestamp_clears_when_pause_lifts() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(&dir);
        coord.set_user_pause(true);
        assert!(coord.snapshot().pause_timestamp.is_some());
        coord.set_user_pause(false);
        assert!(coord.snapshot().pause_timestamp.is_none());
    }
}
