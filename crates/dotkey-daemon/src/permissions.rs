//! OS permission probes for global keystroke monitoring.
//!
//! `check_permission` is silent and safe to call from the engine; failure
//! pauses the engine through the coordinator rather than crashing it.
//! `prompt_permission` triggers the OS-side dialog or settings pane.

/// Silently probe whether keystroke monitoring is permitted.
#[cfg(target_os = "macos")]
pub fn check_permission() -> bool {
    use std::process::Command;

    // An AppleScript round-trip through System Events only succeeds when the
    // hosting process has accessibility permission.
    let probe = Command::new("osascript")
        .arg("-e")
        .arg("tell application \"System Events\" to return name of first process")
        .output();

    match probe {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
pub fn check_permission() -> bool {
    use std::path::Path;

    // Reading input devices requires membership in the input group (or
    // equivalent). Try an event device first, fall back to group membership.
    if Path::new("/dev/input/event0").exists() {
        return std::fs::File::open("/dev/input/event0").is_ok();
    }

    let output = std::process::Command::new("groups")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok());

    match output {
        Some(groups) => groups.contains("input"),
        None => false,
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn check_permission() -> bool {
    // Windows needs no explicit grant for keyboard hooks.
    true
}

/// Trigger the OS permission flow.
#[cfg(target_os = "macos")]
pub fn prompt_permission() {
    use std::process::Command;

    println!("dotkey needs accessibility permission to detect typed commands.");
    println!("Grant it under Privacy & Security > Privacy > Accessibility,");
    println!("and on macOS 14+ also under Input Monitoring.");

    let _ = Command::new("open")
        .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility")
        .status();
}

#[cfg(target_os = "linux")]
pub fn prompt_permission() {
    println!("dotkey needs permission to read input devices.");
    println!("Add your user to the 'input' group (log out and back in afterwards):");
    println!("  sudo usermod -a -G input $USER");
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn prompt_permission() {
    println!("No additional permissions are required on this platform.");
    println!("If expansions do not fire, check your antivirus settings:");
    println!("keyboard monitoring is sometimes blocked there.");
}
