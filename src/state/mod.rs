// State management module
//
// SessionState holds the connection lifecycle and the session counters shown
// in the status line. It lives on the UI thread inside the controller, so it
// needs no locking; every mutation reports what changed as a StateChange.

use crate::models::ConnectionState;
use thiserror::Error;

/// Change events produced by state mutations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// The connection moved through the lifecycle
    ConnectionChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// A command was queued for the worker
    CommandSent { total: u64 },

    /// A data chunk arrived from the worker
    ChunkReceived { total: u64, bytes: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid connection transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Connection lifecycle plus counters for one session
///
/// Transitions follow `Idle -> Opening -> Open -> Closing -> Closed`, with the
/// shortcuts [`ConnectionState::can_transition_to`] allows. Anything else is
/// rejected with [`StateError::InvalidTransition`] and leaves the state as it was.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    connection: ConnectionState,
    commands_sent: u64,
    chunks_received: u64,
    bytes_received: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_open(&self) -> bool {
        self.connection == ConnectionState::Open
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Move the connection to `next`.
    ///
    /// # Returns
    /// The change that was applied, or the rejected transition
    pub fn transition(&mut self, next: ConnectionState) -> Result<StateChange, StateError> {
        let from = self.connection;
        if !from.can_transition_to(next) {
            return Err(StateError::InvalidTransition { from, to: next });
        }

        self.connection = next;
        tracing::info!("Connection state {} -> {}", from, next);
        Ok(StateChange::ConnectionChanged { from, to: next })
    }

    pub fn record_command(&mut self) -> StateChange {
        self.commands_sent += 1;
        StateChange::CommandSent {
            total: self.commands_sent,
        }
    }

    pub fn record_chunk(&mut self, bytes: usize) -> StateChange {
        self.chunks_received += 1;
        self.bytes_received += bytes as u64;
        StateChange::ChunkReceived {
            total: self.chunks_received,
            bytes,
        }
    }

    /// `<state> | <device> @ <baud> | tx <n> rx <n>`
    pub fn status_line(&self, device: &str, baud_rate: u32) -> String {
        format!(
            "{} | {} @ {} | tx {} rx {}",
            self.connection, device, baud_rate, self.commands_sent, self.chunks_received
        )
    }
}
