// UI Controller - owns all rendering state of the terminal
//
// The controller has no Slint types: it talks to the screen
// through the Renderer trait and to the worker through the outbound channel,
// the stop signal and the worker handle. The Slint side (gui.rs) owns one
// controller on the event loop thread and feeds it user events and relayed
// chunks; tests drive it directly with a recording renderer.

use crate::channel::{OutboundSender, StopSignal};
use crate::models::{ChunkKind, ConnectionConfig, ConnectionState, InboundChunk, OutboundMessage};
use crate::services::{SupervisorError, WorkerExit, WorkerHandle};
use crate::state::{SessionState, StateChange};
use std::time::Duration;

/// The rendering collaborator.
///
/// All calls are synchronous and must not block.
pub trait Renderer {
    /// Append one entry to the scrollback
    fn append_line(&mut self, line: &str);

    /// Return the current input field text and clear the field
    fn take_input(&mut self) -> String;

    fn set_status(&mut self, status: &str);

    fn set_input_enabled(&mut self, enabled: bool);
}

/// Why the session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Quit button or window close; the event loop ends afterwards
    UserQuit,
    /// The worker reported a fatal condition; the UI stays up to show it
    WorkerFailed,
}

/// A worker join that still has to happen off the event loop.
///
/// Returned by [`UiController::request_shutdown`]; the caller awaits
/// [`wait`](Self::wait) on the async runtime and hands the report back to
/// [`UiController::finish_shutdown`] on the UI thread.
#[derive(Debug)]
pub struct PendingJoin {
    worker: Option<WorkerHandle>,
    timeout: Duration,
    reason: ShutdownReason,
}

/// Result of a finished [`PendingJoin`]
#[derive(Debug)]
pub struct JoinReport {
    pub reason: ShutdownReason,
    /// `Ok(None)` when there was no worker left to join
    pub outcome: Result<Option<WorkerExit>, SupervisorError>,
}

impl PendingJoin {
    pub fn reason(&self) -> ShutdownReason {
        self.reason
    }

    pub async fn wait(self) -> JoinReport {
        let outcome = match self.worker {
            Some(worker) => worker.join(self.timeout).await.map(Some),
            None => Ok(None),
        };

        JoinReport {
            reason: self.reason,
            outcome,
        }
    }
}

impl JoinReport {
    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, Err(SupervisorError::ShutdownTimeout(_)))
    }
}

/// Turn a chunk into displayable text.
///
/// Never fails: invalid UTF-8 becomes U+FFFD. Line endings are normalised and
/// trailing whitespace dropped, since every chunk becomes its own entry.
/// Leading indentation is kept.
pub fn display_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let normalized = text.replace("\r\n", "\n").replace('\r', "");
    normalized.trim_end().to_string()
}

/// Headless terminal controller
pub struct UiController<R: Renderer> {
    renderer: R,
    config: ConnectionConfig,
    state: SessionState,
    outbound: OutboundSender,
    stop: StopSignal,
    worker: Option<WorkerHandle>,
    join_timeout: Duration,
}

impl<R: Renderer> UiController<R> {
    /// Create a controller for one session
    ///
    /// # Arguments
    /// * `renderer` - rendering collaborator
    /// * `config` - connection parameters (shown in the status line)
    /// * `outbound` - producer end of the outbound channel
    /// * `stop` - the session's stop signal
    /// * `worker` - handle joined at shutdown (`None` if there is nothing to join)
    /// * `join_timeout` - bound on the shutdown join
    pub fn new(
        renderer: R,
        config: ConnectionConfig,
        outbound: OutboundSender,
        stop: StopSignal,
        worker: Option<WorkerHandle>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            config,
            state: SessionState::new(),
            outbound,
            stop,
            worker,
            join_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.connection()
    }

    pub fn session(&self) -> &SessionState {
        &self.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// `Idle -> Opening`; the worker is expected to be starting already.
    pub fn start(&mut self) {
        self.apply(ConnectionState::Opening);
        self.renderer.set_input_enabled(false);
        self.renderer.append_line(&format!(
            "Connecting to {} @ {}...",
            self.config.device, self.config.baud_rate
        ));
        self.refresh_status();
    }

    /// Handle the user pressing enter in the input field.
    ///
    /// # Returns
    /// `true` if a command was queued for the worker
    pub fn submit_command(&mut self) -> bool {
        let input = self.renderer.take_input();
        let command = input.trim_end_matches(['\r', '\n']);
        if command.trim().is_empty() {
            return false;
        }

        if !self.state.is_open() {
            let state = self.state();
            tracing::debug!("Command '{}' ignored in state {}", command, state);
            self.renderer
                .append_line(&format!("[SYSTEM] not connected ({})", state));
            return false;
        }

        if let Err(e) = self.outbound.send(OutboundMessage::from_command(command)) {
            tracing::warn!("Could not queue command '{}': {}", command, e);
            self.renderer
                .append_line(&format!("[SYSTEM] command not sent: {}", e));
            return false;
        }

        let change = self.state.record_command();
        self.record(change);
        self.renderer.append_line(&format!(">> {}", command));
        self.refresh_status();
        true
    }

    /// Handle one relayed chunk.
    ///
    /// Every chunk becomes exactly one scrollback entry. A fatal system chunk
    /// starts the shutdown of the session; the returned join has to be awaited
    /// by the caller.
    pub fn handle_inbound(&mut self, chunk: InboundChunk) -> Option<PendingJoin> {
        self.renderer.append_line(&display_text(chunk.bytes()));

        let pending = match chunk.kind() {
            ChunkKind::Data => {
                let change = self.state.record_chunk(chunk.len());
                self.record(change);
                None
            }
            ChunkKind::Ready => {
                if self.apply(ConnectionState::Open) {
                    self.renderer.set_input_enabled(true);
                }
                None
            }
            ChunkKind::OpenFailed => {
                // Straight to Closed: the worker already ended without looping
                self.apply(ConnectionState::Closed);
                self.renderer.set_input_enabled(false);
                self.stop.set();
                Some(self.pending_join(ShutdownReason::WorkerFailed))
            }
            ChunkKind::WorkerExited => match self.state() {
                ConnectionState::Opening | ConnectionState::Open => {
                    Some(self.request_shutdown(ShutdownReason::WorkerFailed))
                }
                state => {
                    tracing::debug!("Worker exit notice ignored in state {}", state);
                    None
                }
            },
        };

        self.refresh_status();
        pending
    }

    /// Set the stop signal and move to `Closing`.
    ///
    /// Never blocks; the join itself is handed back to the caller.
    pub fn request_shutdown(&mut self, reason: ShutdownReason) -> PendingJoin {
        tracing::info!("Shutdown requested ({:?}) in state {}", reason, self.state());

        match self.state() {
            ConnectionState::Opening | ConnectionState::Open => {
                self.apply(ConnectionState::Closing);
            }
            ConnectionState::Idle => {
                self.apply(ConnectionState::Closed);
            }
            ConnectionState::Closing | ConnectionState::Closed => {}
        }

        self.stop.set();
        self.renderer.set_input_enabled(false);
        self.refresh_status();
        self.pending_join(reason)
    }

    /// Complete a shutdown once the join finished or timed out.
    ///
    /// A join timeout is reported, never fatal.
    pub fn finish_shutdown(&mut self, report: &JoinReport) {
        match &report.outcome {
            Ok(Some(exit)) => tracing::info!("Worker joined: {}", exit),
            Ok(None) => tracing::debug!("No worker left to join"),
            Err(SupervisorError::ShutdownTimeout(timeout)) => {
                tracing::warn!("Worker did not stop within {:?}", timeout);
                self.renderer.append_line(&format!(
                    "[SYSTEM] WARNING: worker did not stop within {} ms",
                    timeout.as_millis()
                ));
            }
            Err(e) => {
                tracing::warn!("Worker join failed: {}", e);
                self.renderer
                    .append_line(&format!("[SYSTEM] WARNING: {}", e));
            }
        }

        if self.state() == ConnectionState::Closing {
            self.apply(ConnectionState::Closed);
        }
        self.refresh_status();
    }

    fn pending_join(&mut self, reason: ShutdownReason) -> PendingJoin {
        PendingJoin {
            worker: self.worker.take(),
            timeout: self.join_timeout,
            reason,
        }
    }

    /// Apply a transition, logging and ignoring an invalid one.
    fn apply(&mut self, next: ConnectionState) -> bool {
        match self.state.transition(next) {
            Ok(change) => {
                self.record(change);
                true
            }
            Err(e) => {
                tracing::warn!("Ignoring {}", e);
                false
            }
        }
    }

    fn record(&self, change: StateChange) {
        tracing::trace!("State change: {:?}", change);
    }

    fn refresh_status(&mut self) {
        let status = self
            .state
            .status_line(&self.config.device, self.config.baud_rate);
        self.renderer.set_status(&status);
    }
}
