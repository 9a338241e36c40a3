pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod models;
pub mod pause;
pub mod rules;

// Re-export common items for convenience
pub use buffer::{BufferAction, MatchBuffer};
pub use config::{get_config_dir, is_daemon_running, MAX_COMMAND_LEN, SENTINEL_CHAR};
pub use error::{DotkeyError, Result};
pub use events::{classify_key, EngineEvent, InputEvent, KeyClass};
pub use guard::SyntheticInputGuard;
pub use models::{validate_command, validate_replacement, ExpansionRule};
pub use pause::{effective_pause, PauseCoordinator, PauseReason, PauseStateInfo};
pub use rules::{load_rules_file, RuleTable};
