//! HTTP command surface for a running dotkey engine.
//!
//! The server runs in-process with the daemon worker and exposes the engine's
//! command set over loopback HTTP. It never sees keystrokes; everything it
//! reports comes from the engine's own counters and the pause coordinator.

pub mod api;
pub mod server;

pub use api::models::ApiResponse;
pub use server::http_server::{check_api_server_health, start_api_server};
pub use server::utils::{get_api_server_port, port_is_available, remove_port_file, save_api_port};
