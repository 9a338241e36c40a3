//! Utilities for managing the API server.

use std::fs;
use std::io::Write;

use dotkey_core::config::{ensure_config_dir, get_config_dir, PORT_FILENAME};
use dotkey_core::{DotkeyError, Result};

/// Try to get the API server port from stored configuration
pub fn get_api_server_port() -> Result<u16> {
    let port_file_path = get_config_dir().join(PORT_FILENAME);

    if port_file_path.exists() {
        let contents = fs::read_to_string(port_file_path)?;
        contents
            .trim()
            .parse::<u16>()
            .map_err(|_| DotkeyError::Other("Invalid port stored in configuration".to_string()))
    } else {
        Err(DotkeyError::Other(
            "API server port information not found".to_string(),
        ))
    }
}

/// Check if a port is available by trying to bind to it
pub fn port_is_available(port: u16) -> bool {
    use std::net::TcpListener;
    TcpListener::bind(format!("127.0.0.1:{}", port)).is_ok()
}

/// Save the API port to a configuration file
pub fn save_api_port(port: u16) -> Result<()> {
    let config_dir = ensure_config_dir()?;
    let port_file_path = config_dir.join(PORT_FILENAME);
    let mut file = fs::File::create(port_file_path)?;
    write!(file, "{}", port)?;
    Ok(())
}

/// Remove the stored port file; called when the daemon shuts down.
pub fn remove_port_file() {
    let port_file_path = get_config_dir().join(PORT_FILENAME);
    if port_file_path.exists() {
        let _ = fs::remove_file(port_file_path);
    }
}
