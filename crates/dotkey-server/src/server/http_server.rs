//! HTTP server implementation for the dotkey API.

use std::net::SocketAddr;
use std::sync::Arc;

use dotkey_core::{DotkeyError, Result};
use dotkey_daemon::engine::Engine;
use tracing::info;
use warp::Filter;

use crate::api::handlers;
use crate::api::models::{OptionsRequest, PauseRequest};
use crate::server::utils::save_api_port;

/// Start the HTTP API server on the specified port, serving the given
/// engine. Blocks until a shutdown signal arrives.
pub async fn start_api_server(port: u16, engine: Arc<Engine>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    // Save the port to file so the CLI can find us later
    save_api_port(port)?;

    // CORS for the settings panel during development
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Content-Type"])
        .allow_methods(vec!["GET", "POST"]);

    let with_engine = {
        let engine = Arc::clone(&engine);
        warp::any().map(move || Arc::clone(&engine))
    };

    let get_pause_route = warp::path!("api" / "pause")
        .and(warp::get())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::get_pause_state(&engine)));

    let set_pause_route = warp::path!("api" / "pause")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine.clone())
        .map(|body: PauseRequest, engine: Arc<Engine>| {
            warp::reply::json(&handlers::set_pause_state(&engine, body.paused, body.by_user))
        });

    let toggle_pause_route = warp::path!("api" / "pause" / "toggle")
        .and(warp::post())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::toggle_pause(&engine)));

    let status_route = warp::path!("api" / "status")
        .and(warp::get())
        .and(with_engine.clone())
        .map(move |engine: Arc<Engine>| warp::reply::json(&handlers::get_status(&engine, port)));

    let diagnostics_route = warp::path!("api" / "diagnostics")
        .and(warp::get())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::get_diagnostics(&engine)));

    let options_route = warp::path!("api" / "options")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine.clone())
        .map(|body: OptionsRequest, engine: Arc<Engine>| {
            warp::reply::json(&handlers::set_options(&engine, body.verbose, body.dry_run))
        });

    let reload_rules_route = warp::path!("api" / "rules" / "reload")
        .and(warp::post())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::reload_rules(&engine)));

    let get_permission_route = warp::path!("api" / "permission")
        .and(warp::get())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::get_permission(&engine)));

    let prompt_permission_route = warp::path!("api" / "permission" / "prompt")
        .and(warp::post())
        .and(with_engine.clone())
        .map(|engine: Arc<Engine>| warp::reply::json(&handlers::prompt_permission(&engine)));

    // Health check endpoint
    let health_route = warp::path!("health").map(|| "dotkey API is running");

    // More specific paths first so `pause/toggle` is not eaten by `pause`
    let routes = toggle_pause_route
        .or(get_pause_route)
        .or(set_pause_route)
        .or(status_route)
        .or(diagnostics_route)
        .or(options_route)
        .or(reload_rules_route)
        .or(prompt_permission_route)
        .or(get_permission_route)
        .or(health_route)
        .with(cors);

    let server = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, stopping API server");
    });

    match server {
        Ok((addr, server)) => {
            info!(%addr, "API server started");
            server.await;
            Ok(())
        }
        Err(e) => Err(DotkeyError::Other(format!(
            "Failed to bind to port {}: {}",
            port, e
        ))),
    }
}

/// Check the health of a running API server by opening a TCP connection to
/// the stored port.
pub fn check_api_server_health() -> Result<u16> {
    let port = crate::server::utils::get_api_server_port()?;
    std::net::TcpStream::connect(format!("127.0.0.1:{}", port))
        .map_err(|e| DotkeyError::Other(format!("Failed to connect to API server: {}", e)))?;
    Ok(port)
}
