use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

/// Leading character that marks the start of a candidate command.
pub const SENTINEL_CHAR: char = '.';

/// Maximum length of a command, sentinel included.
pub const MAX_COMMAND_LEN: usize = 50;

/// Maximum length of a replacement text in characters.
pub const MAX_REPLACEMENT_LEN: usize = 10_000;

/// Maximum number of lines in a replacement text.
pub const MAX_REPLACEMENT_LINES: usize = 100;

pub const PID_FILENAME: &str = "dotkey-daemon.pid";
pub const RULES_FILENAME: &str = "rules.json";
pub const PAUSE_FILENAME: &str = "pause_state.json";
pub const PORT_FILENAME: &str = "api_port.txt";
pub const LOG_FILENAME: &str = "daemon_log.txt";

/// Get the dotkey configuration directory.
///
/// `DOTKEY_CONFIG_DIR` overrides the default `~/.dotkey`, which also lets
/// tests point the engine at a scratch directory.
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOTKEY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".dotkey"))
        .unwrap_or_else(|_| PathBuf::from(".dotkey"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

/// Get the path to the PID file
pub fn get_pid_file_path() -> PathBuf {
    get_config_dir().join(PID_FILENAME)
}

/// Get the path to the rules file
pub fn get_rules_file_path() -> PathBuf {
    get_config_dir().join(RULES_FILENAME)
}

/// Get the path to the persisted pause-state file
pub fn get_pause_file_path() -> PathBuf {
    get_config_dir().join(PAUSE_FILENAME)
}

/// Get the path to the daemon log file
pub fn get_log_file_path() -> PathBuf {
    get_config_dir().join(LOG_FILENAME)
}

/// Check if the daemon is running by reading its PID file.
pub fn is_daemon_running() -> Result<Option<u32>> {
    let pid_file = get_pid_file_path();

    if pid_file.exists() {
        match fs::read_to_string(&pid_file) {
            Ok(contents) => {
                match contents.trim().parse::<u32>() {
                    Ok(pid) => Ok(Some(pid)),
                    Err(_) => {
                        // Invalid PID, treat as not running and clean up
                        let _ = fs::remove_file(&pid_file);
                        Ok(None)
                    }
                }
            }
            Err(_) => {
                // Can't read file, treat as not running and clean up
                let _ = fs::remove_file(&pid_file);
                Ok(None)
            }
        }
    } else {
        Ok(None)
    }
}
