// atterm - interactive AT-command terminal for serial devices
//
// This is the library crate: channel pair, serial worker, bridge and the UI
// controller. The binary crate (main.rs) provides the GUI entry point and the
// hidden worker process mode.

pub mod channel;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use crate::channel::{StopSignal, channel_pair};
pub use crate::config::ConfigManager;
pub use models::{ConnectionConfig, InboundChunk, OutboundMessage, UserConfig};
pub use state::{SessionState, StateChange};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
