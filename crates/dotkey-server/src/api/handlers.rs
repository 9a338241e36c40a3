//! Request handlers bridging the HTTP surface to the engine.
//!
//! Every handler goes through the engine's command surface; none of them
//! touch engine internals or files the engine owns.

use std::sync::Arc;

use dotkey_core::config::{get_config_dir, get_rules_file_path, is_daemon_running};
use dotkey_core::pause::PauseStateInfo;
use dotkey_core::rules::load_rules_file;
use dotkey_daemon::engine::Engine;
use dotkey_daemon::status::StatusInfo;

use crate::api::models::{ApiResponse, ApiServerInfo, DaemonInfo, StatusReport};

pub fn get_pause_state(engine: &Arc<Engine>) -> ApiResponse<PauseStateInfo> {
    ApiResponse::success(engine.pause_state())
}

pub fn set_pause_state(
    engine: &Arc<Engine>,
    paused: bool,
    by_user: bool,
) -> ApiResponse<PauseStateInfo> {
    engine.set_pause(paused, by_user);
    ApiResponse::success(engine.pause_state())
}

pub fn toggle_pause(engine: &Arc<Engine>) -> ApiResponse<PauseStateInfo> {
    engine.toggle_pause();
    ApiResponse::success(engine.pause_state())
}

pub fn get_status(engine: &Arc<Engine>, port: u16) -> ApiResponse<StatusReport> {
    let StatusInfo { state, reason } = engine.status_info();
    let pid = is_daemon_running().unwrap_or(None);
    ApiResponse::success(StatusReport {
        state,
        reason,
        engine_running: engine.is_running(),
        rules_loaded: engine.rules_loaded(),
        expansions: engine.expansion_count(),
        daemon: DaemonInfo {
            pid,
            config_path: get_config_dir().display().to_string(),
            api_server: ApiServerInfo {
                port,
                url: format!("http://localhost:{}", port),
            },
        },
    })
}

pub fn get_diagnostics(engine: &Arc<Engine>) -> ApiResponse<Vec<String>> {
    ApiResponse::success(engine.diagnostics())
}

pub fn set_options(
    engine: &Arc<Engine>,
    verbose: Option<bool>,
    dry_run: Option<bool>,
) -> ApiResponse<&'static str> {
    engine.set_options(verbose, dry_run);
    ApiResponse::success("options updated")
}

/// Re-read the rules file and swap the engine's table.
pub fn reload_rules(engine: &Arc<Engine>) -> ApiResponse<usize> {
    match load_rules_file(&get_rules_file_path()) {
        Ok(rules) => {
            engine.load_rules(rules);
            ApiResponse::success(engine.rules_loaded())
        }
        Err(e) => ApiResponse::error(format!("Failed to load rules: {}", e)),
    }
}

pub fn get_permission(engine: &Arc<Engine>) -> ApiResponse<bool> {
    ApiResponse::success(engine.check_permission())
}

pub fn prompt_permission(engine: &Arc<Engine>) -> ApiResponse<bool> {
    ApiResponse::success(engine.prompt_permission())
}
