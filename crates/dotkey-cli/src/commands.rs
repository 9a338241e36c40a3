use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use dotkey_core::config::{ensure_config_dir, get_pause_file_path};
use dotkey_core::pause::PauseCoordinator;
use dotkey_core::{DotkeyError, Result};
use dotkey_daemon::{
    attach_monitor, build_engine, daemon_status, init_worker_logging, remove_pid_file,
    run_worker_loop, start_daemon, stop_daemon, write_pid_file,
};
use dotkey_server::server::http_server::{check_api_server_health, start_api_server};
use dotkey_server::server::utils::{get_api_server_port, remove_port_file};
use tracing::{error, info};

use crate::cli::Commands;

pub fn handle_command(command: Option<Commands>) -> Result<()> {
    match command {
        Some(command) => handle_subcommand(command),
        // Default: show status when no command provided
        None => daemon_status(),
    }
}

fn handle_subcommand(command: Commands) -> Result<()> {
    match command {
        Commands::Start { port } => start_daemon(port),
        Commands::Stop => {
            stop_daemon()?;
            remove_port_file();
            Ok(())
        }
        Commands::Status => daemon_status(),
        Commands::Pause => set_pause_intent(true),
        Commands::Resume => set_pause_intent(false),
        Commands::Toggle => toggle_pause_intent(),
        Commands::Serve { port } => handle_serve_command(port),
        Commands::Port => handle_port_command(),
        Commands::ApiStatus => handle_api_status(),
        Commands::DaemonWorker { port } => run_worker(port),
    }
}

/// Write the user pause flag where the daemon will pick it up on its next
/// poll tick. Works whether or not the daemon is running; intent survives
/// restarts either way.
fn set_pause_intent(paused: bool) -> Result<()> {
    ensure_config_dir()?;
    let coordinator = PauseCoordinator::load(get_pause_file_path());
    coordinator.set_user_pause(paused);
    coordinator.persist_now()?;

    if paused {
        println!("Expansions paused. Run 'dotkey resume' to re-enable them.");
    } else {
        println!("Expansions resumed.");
    }
    Ok(())
}

fn toggle_pause_intent() -> Result<()> {
    ensure_config_dir()?;
    let coordinator = PauseCoordinator::load(get_pause_file_path());
    let paused = coordinator.toggle_user_pause();
    coordinator.persist_now()?;

    if paused {
        println!("Expansions paused.");
    } else {
        println!("Expansions resumed.");
    }
    Ok(())
}

fn handle_serve_command(port: u16) -> Result<()> {
    // API server only, no keystroke monitor attached
    let ctx = build_engine()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DotkeyError::Other(format!("Failed to build runtime: {}", e)))?;

    runtime.block_on(async {
        println!("Starting standalone API server on port {}...", port);
        start_api_server(port, Arc::clone(&ctx.engine)).await
    })
}

fn handle_port_command() -> Result<()> {
    match get_api_server_port() {
        Ok(port) => {
            println!("dotkey API server is running on port {}", port);
            println!("URL: http://localhost:{}", port);
            Ok(())
        }
        Err(_) => {
            println!("dotkey API server port information not found.");
            println!("The daemon may not be running. Try 'dotkey status' for more details.");
            Ok(())
        }
    }
}

fn handle_api_status() -> Result<()> {
    let port = check_api_server_health()?;
    println!("API server is responsive on port {}", port);
    Ok(())
}

/// Entry point of the detached daemon worker process. Owns the engine, the
/// keystroke monitor, the API server, and the config poll loop.
pub fn run_worker(port: u16) -> Result<()> {
    init_worker_logging()?;
    write_pid_file()?;
    info!(port, "daemon worker starting");

    let ctx = build_engine()?;
    if let Err(e) = attach_monitor(&ctx) {
        // Without the monitor there is nothing to expand; the API server
        // would only report a dead engine.
        remove_pid_file();
        return Err(e);
    }

    let server_engine = Arc::clone(&ctx.engine);
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("failed to build API server runtime: {}", e);
                return;
            }
        };
        if let Err(e) = runtime.block_on(start_api_server(port, server_engine)) {
            error!("API server exited: {}", e);
        }
    });

    // Runs until the process is terminated by `dotkey stop`
    let running = AtomicBool::new(true);
    run_worker_loop(&ctx, &running);

    ctx.engine.stop();
    remove_pid_file();
    Ok(())
}
