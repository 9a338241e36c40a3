use std::fs::{self, File};
use std::io::Write;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use dotkey_core::config::{
    ensure_config_dir, get_config_dir, get_log_file_path, get_pause_file_path, get_pid_file_path,
    get_rules_file_path,
};
use dotkey_core::guard::SyntheticInputGuard;
use dotkey_core::pause::PauseCoordinator;
use dotkey_core::rules::load_rules_file;
use dotkey_core::{is_daemon_running, DotkeyError, Result};
use tracing::{info, warn};

use crate::backend::{EnigoInjector, RdevBackend};
use crate::engine::Engine;
use crate::permissions;
use crate::process::verify_process_running;
use crate::status::StatusSurface;

/// How often the worker polls the rules and pause files.
const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Re-probe the OS permission every this many poll ticks.
const PERMISSION_PROBE_TICKS: u32 = 30;

/// Everything the daemon worker owns.
pub struct DaemonContext {
    pub engine: Arc<Engine>,
    pub pause: Arc<PauseCoordinator>,
    pub status: Arc<StatusSurface>,
    pub guard: SyntheticInputGuard,
}

/// Build the engine from persisted state: pause intent restored, rules
/// loaded, permission probed.
pub fn build_engine() -> Result<DaemonContext> {
    ensure_config_dir()?;

    let pause = Arc::new(PauseCoordinator::load(get_pause_file_path()));
    let status = Arc::new(StatusSurface::new());
    let guard = SyntheticInputGuard::new();
    let engine = Arc::new(Engine::new(
        Arc::clone(&pause),
        Arc::clone(&status),
        guard.clone(),
    ));

    match load_rules_file(&get_rules_file_path()) {
        Ok(rules) => engine.load_rules(rules),
        Err(e) => warn!("could not load rules file: {}", e),
    }
    engine.check_permission();

    Ok(DaemonContext {
        engine,
        pause,
        status,
        guard,
    })
}

/// Attach the OS-level monitor and injector to the engine.
///
/// The backend filters on the same guard instance the injector raises.
pub fn attach_monitor(ctx: &DaemonContext) -> Result<()> {
    let backend = RdevBackend::spawn(
        ctx.guard.clone(),
        Arc::clone(&ctx.pause),
        Arc::clone(&ctx.status),
    );
    let injector = EnigoInjector::new()?;
    ctx.engine.start(Box::new(backend), Box::new(injector))
}

/// The worker's poll loop: pick up rules-file edits and externally written
/// pause intent, and periodically re-probe the permission. Runs until
/// `running` clears.
pub fn run_worker_loop(ctx: &DaemonContext, running: &AtomicBool) {
    let rules_path = get_rules_file_path();
    let pause_path = get_pause_file_path();
    let mut rules_mtime = file_mtime(&rules_path);
    let mut pause_mtime = file_mtime(&pause_path);
    let mut ticks = 0u32;

    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let current = file_mtime(&rules_path);
        if current != rules_mtime {
            rules_mtime = current;
            match load_rules_file(&rules_path) {
                Ok(rules) => {
                    info!("rules file changed, reloading");
                    ctx.engine.load_rules(rules);
                }
                Err(e) => warn!("failed to reload rules: {}", e),
            }
        }

        let current = file_mtime(&pause_path);
        if current != pause_mtime {
            pause_mtime = current;
            ctx.engine.sync_pause_from_disk();
        }

        ticks += 1;
        if ticks >= PERMISSION_PROBE_TICKS {
            ticks = 0;
            ctx.engine.check_permission();
        }
    }
}

fn file_mtime(path: &std::path::Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Install the worker's tracing subscriber, writing to the daemon log file.
pub fn init_worker_logging() -> Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(get_log_file_path())?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .init();
    Ok(())
}

/// Create the PID file for the current process.
pub fn write_pid_file() -> Result<()> {
    let mut file = File::create(get_pid_file_path())?;
    write!(file, "{}", process::id())?;
    Ok(())
}

pub fn remove_pid_file() {
    let _ = fs::remove_file(get_pid_file_path());
}

/// Start the daemon as a detached background process.
pub fn start_daemon(api_port: u16) -> Result<()> {
    if let Some(pid) = is_daemon_running()? {
        if verify_process_running(pid) {
            println!("Daemon is already running with PID {}.", pid);
            return Ok(());
        }
        // PID file exists but process is not running - clean up and restart
        println!("Found stale PID file. Cleaning up and starting new daemon...");
        remove_pid_file();
    }

    println!("Starting dotkey daemon...");
    ensure_config_dir()?;

    // A missing permission is not fatal: the engine starts paused through
    // the coordinator and resumes once the grant arrives.
    if !permissions::check_permission() {
        println!("Accessibility permission is not granted; expansions stay paused until it is.");
        permissions::prompt_permission();
    }

    let current_exe = std::env::current_exe()?;
    let log_file = get_log_file_path();

    #[cfg(unix)]
    {
        use std::process::Command;

        let cmd = format!(
            "nohup {} daemon-worker --port {} >> {} 2>&1 &",
            current_exe.to_string_lossy(),
            api_port,
            log_file.to_string_lossy()
        );
        Command::new("sh").arg("-c").arg(&cmd).status()?;
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        let cmd = format!(
            "START /B \"dotkey Daemon\" \"{}\" daemon-worker --port {} > \"{}\" 2>&1",
            current_exe.to_string_lossy(),
            api_port,
            log_file.to_string_lossy()
        );
        Command::new("cmd").arg("/C").arg(&cmd).status()?;
    }

    // Wait for the worker to create its PID file
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        if is_daemon_running()?.is_some() {
            break;
        }
    }

    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => {
            println!("Daemon started successfully with PID {}.", pid);
            println!("API server listening on http://localhost:{}", api_port);
            Ok(())
        }
        _ => Err(DotkeyError::Other(format!(
            "Daemon failed to start. Check logs at {}",
            log_file.display()
        ))),
    }
}

/// Stop the daemon if it's running
pub fn stop_daemon() -> Result<()> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Err(DotkeyError::DaemonNotRunning);
    }

    let pid_str = match fs::read_to_string(&pid_file) {
        Ok(content) => content,
        Err(e) => {
            let _ = fs::remove_file(&pid_file);
            return Err(DotkeyError::Other(format!("Failed to read PID file: {}", e)));
        }
    };

    let pid = match pid_str.trim().parse::<u32>() {
        Ok(pid) => pid,
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            return Err(DotkeyError::InvalidPid);
        }
    };

    println!("Attempting to stop daemon with PID {}...", pid);

    if !verify_process_running(pid) {
        println!("Process with PID {} is not running.", pid);
        let _ = fs::remove_file(&pid_file);
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::process::Command;

        // SIGTERM first for a graceful exit
        let mut stopped = Command::new("kill")
            .arg(pid.to_string())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        if !stopped || verify_process_running(pid) {
            thread::sleep(Duration::from_millis(500));
            if verify_process_running(pid) {
                println!("Daemon didn't terminate gracefully, using force kill...");
                stopped = Command::new("kill")
                    .args(["-9", &pid.to_string()])
                    .status()
                    .map(|s| s.success())
                    .unwrap_or(false);
            } else {
                stopped = true;
            }
        }

        if !stopped {
            println!("WARNING: Failed to stop daemon process. Removing PID file anyway.");
        }
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        let mut stopped = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        if !stopped || verify_process_running(pid) {
            thread::sleep(Duration::from_millis(500));
            if verify_process_running(pid) {
                println!("Daemon didn't terminate gracefully, using force kill...");
                stopped = Command::new("taskkill")
                    .args(["/F", "/T", "/PID", &pid.to_string()])
                    .status()
                    .map(|s| s.success())
                    .unwrap_or(false);
            } else {
                stopped = true;
            }
        }

        if !stopped {
            println!("WARNING: Failed to stop daemon process. Removing PID file anyway.");
        }
    }

    let _ = fs::remove_file(&pid_file);
    println!("Daemon stopped.");
    Ok(())
}

/// Check daemon status
pub fn daemon_status() -> Result<()> {
    match is_daemon_running()? {
        Some(pid) => {
            if verify_process_running(pid) {
                println!("dotkey daemon is running with PID {}", pid);
                println!("Config directory: {}", get_config_dir().display());
            } else {
                println!("PID file exists but process {} is not running", pid);
                println!("The daemon may have crashed; run 'dotkey stop' then 'dotkey start'");
            }
            Ok(())
        }
        None => {
            println!("dotkey daemon is not running");
            Ok(())
        }
    }
}
