//! Data models for API requests and responses.

use dotkey_daemon::status::PresentationState;
use serde::{Deserialize, Serialize};

/// Standard API response format
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Full status report for `GET /api/status`.
#[derive(Serialize, Deserialize)]
pub struct StatusReport {
    pub state: PresentationState,
    pub reason: String,
    pub engine_running: bool,
    pub rules_loaded: usize,
    pub expansions: usize,
    pub daemon: DaemonInfo,
}

/// Daemon process information
#[derive(Serialize, Deserialize)]
pub struct DaemonInfo {
    pub pid: Option<u32>,
    pub config_path: String,
    pub api_server: ApiServerInfo,
}

/// API server information
#[derive(Serialize, Deserialize)]
pub struct ApiServerInfo {
    pub port: u16,
    pub url: String,
}

/// Request model for setting the pause flag
#[derive(Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
    /// Defaults to a user-initiated change; the secure-input flag is owned by
    /// the monitor and only settable here for testing.
    #[serde(default = "default_by_user")]
    pub by_user: bool,
}

fn default_by_user() -> bool {
    true
}

/// Request model for flipping engine options
#[derive(Deserialize)]
pub struct OptionsRequest {
    pub verbose: Option<bool>,
    pub dry_run: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_user_defaults_to_true() {
        let req: PauseRequest = serde_json::from_str(r#"{"paused": true}"#).unwrap();
        assert!(req.paused);
        assert!(req.by_user);
    }

    #[test]
    fn error_response_has_no_data() {
        let resp: ApiResponse<u32> = ApiResponse::error("nope".to_string());
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.error.as_deref(), Some("nope"));
    }
}
