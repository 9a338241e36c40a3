pub mod backend;
pub mod daemon_manager;
pub mod engine;
pub mod injector;
pub mod permissions;
pub mod process;
pub mod status;

pub use backend::{EnigoInjector, InputBackend, RdevBackend, TextInjector};
pub use daemon_manager::{
    attach_monitor, build_engine, daemon_status, init_worker_logging, remove_pid_file,
    run_worker_loop, start_daemon, stop_daemon, write_pid_file, DaemonContext,
};
pub use engine::{Engine, EngineOptions, EventBus};
pub use status::{PresentationState, StatusInfo, StatusSink, StatusSurface};
