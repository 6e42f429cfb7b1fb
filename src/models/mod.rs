//! Data models for atterm.
//!
//! - [`ConnectionConfig`]: immutable device/baud/poll-timeout triple owned by the worker
//! - [`UserConfig`]: everything loaded from `atterm.yaml` (connection + session tuning)
//! - [`OutboundMessage`] / [`InboundChunk`]: the payloads crossing the isolation boundary
//! - [`ConnectionState`]: the UI-side connection lifecycle

pub mod config;
pub mod connection;
pub mod message;

pub use config::{
    ConfigError, ConnectionConfig, ConnectionSettings, Isolation, SessionSettings, UserConfig,
};
pub use connection::ConnectionState;
pub use message::{ChunkKind, InboundChunk, LINE_TERMINATOR, OutboundMessage};
