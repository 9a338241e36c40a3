use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "dotkey - a background text expansion engine",
    long_about = "dotkey watches what you type and replaces dot-commands like .sig \
with their configured replacement text."
)]
pub struct Dotkey {
    #[clap(subcommand)]
    pub commands: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the daemon and its API server
    Start {
        #[clap(long, short, default_value = "3000", help = "Port for the API server")]
        port: u16,
    },
    /// Stop the dotkey daemon
    Stop,
    /// Check the status of the dotkey daemon
    Status,
    /// Pause expansions until resumed
    Pause,
    /// Resume expansions
    Resume,
    /// Toggle the pause state
    Toggle,
    /// Start just the API server, without the keystroke monitor
    Serve {
        #[clap(long, short, default_value = "3000", help = "Port to listen on")]
        port: u16,
    },
    /// Show the API server port
    Port,
    /// Check if the API server is responsive
    ApiStatus,
    // Hidden command used internally to run the daemon worker
    #[clap(hide = true)]
    DaemonWorker {
        #[clap(long, default_value = "3000")]
        port: u16,
    },
}
