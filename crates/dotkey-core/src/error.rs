use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DotkeyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Injector error: {0}")]
    Injector(String),
    #[error("Keyboard monitor error: {0}")]
    Monitor(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Daemon is not running")]
    DaemonNotRunning,
    #[error("Invalid PID in daemon file")]
    InvalidPid,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DotkeyError>;
