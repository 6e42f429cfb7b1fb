// Worker supervisor
//
// Starts the Serial Worker behind the isolation boundary and gives the UI a
// handle it can join with a bounded wait. Two flavours:
// - process: `atterm worker ...` child, channel pair carried over its pipes
// - thread:  dedicated OS thread in this process, channel pair shared directly

use crate::channel::{InboundSender, OutboundReceiver, StopSignal, WorkerLink};
use crate::models::{ConnectionConfig, InboundChunk};
use crate::services::device::DeviceOpener;
use crate::services::wire::{self, ControlFrame};
use crate::services::worker::{DEFAULT_IDLE_INTERVAL, SerialWorker, WorkerOutcome};
use camino::Utf8PathBuf;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;

/// Name given to the worker thread in thread isolation mode
pub const WORKER_THREAD_NAME: &str = "atterm-serial";

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("could not locate the atterm executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("could not start the serial worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker process pipes were not available")]
    MissingPipe,

    #[error("waiting for the serial worker failed: {0}")]
    Wait(#[source] std::io::Error),

    #[error("serial worker did not exit within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("serial worker thread panicked")]
    ThreadPanicked,
}

/// How to launch `atterm worker` as a child process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    log_dir: Option<Utf8PathBuf>,
    debug: bool,
    idle_interval: Duration,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            log_dir: None,
            debug: false,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }

    /// Re-launch the running executable in worker mode
    pub fn current_exe() -> Result<Self, SupervisorError> {
        let program = std::env::current_exe().map_err(SupervisorError::CurrentExe)?;
        Ok(Self::new(program))
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<Utf8PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Command line for the child, program excluded
    pub fn args(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--device".to_string(),
            config.device.clone(),
            "--baud".to_string(),
            config.baud_rate.to_string(),
            "--poll-timeout-ms".to_string(),
            config.poll_timeout.as_millis().to_string(),
            "--idle-ms".to_string(),
            self.idle_interval.as_millis().to_string(),
        ];

        if let Some(log_dir) = &self.log_dir {
            args.push("--log-dir".to_string());
            args.push(log_dir.to_string());
        }
        if self.debug {
            args.push("--debug".to_string());
        }
        args
    }
}

/// What a joined worker reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Child process exit code (`None` when killed by a signal)
    Process { code: Option<i32> },
    Thread(WorkerOutcome),
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Process { code: Some(code) } => write!(f, "worker process exited with status {}", code),
            WorkerExit::Process { code: None } => f.write_str("worker process was terminated by a signal"),
            WorkerExit::Thread(WorkerOutcome::Stopped { iterations }) => {
                write!(f, "worker thread stopped after {} iterations", iterations)
            }
            WorkerExit::Thread(WorkerOutcome::OpenFailed(e)) => write!(f, "worker thread ended: {}", e),
        }
    }
}

enum Inner {
    Process { child: Child, pid: Option<u32> },
    Thread { done: oneshot::Receiver<WorkerOutcome> },
}

/// Handle on a running Serial Worker
pub struct WorkerHandle {
    inner: Inner,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker", &self.describe())
            .finish()
    }
}

impl WorkerHandle {
    /// Spawn `atterm worker` and connect its pipes to `link`.
    ///
    /// Must be called from inside a tokio runtime; the pipe pumps run as tasks
    /// on it.
    pub fn spawn_process(
        command: &WorkerCommand,
        config: &ConnectionConfig,
        link: WorkerLink,
        stop: &StopSignal,
    ) -> Result<Self, SupervisorError> {
        let mut child = Command::new(&command.program)
            .args(command.args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let pid = child.id();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SupervisorError::MissingPipe);
        };

        tracing::info!(
            "Spawned worker process {} for {}",
            pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
            config.device
        );

        tokio::spawn(pump_outbound(stdin, link.outbound, stop.clone()));
        tokio::spawn(pump_inbound(stdout, link.inbound, stop.clone()));

        Ok(Self {
            inner: Inner::Process { child, pid },
        })
    }

    /// Run the worker loop on a dedicated OS thread of this process.
    pub fn spawn_thread(
        worker: SerialWorker,
        opener: Box<dyn DeviceOpener>,
        link: WorkerLink,
        stop: &StopSignal,
    ) -> Result<Self, SupervisorError> {
        let (tx, done) = oneshot::channel();
        let stop = stop.clone();

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = worker.run(opener.as_ref(), link, &stop);
                // The handle may have given up on us already
                let _ = tx.send(outcome);
            })
            .map_err(SupervisorError::Spawn)?;

        tracing::info!("Started worker thread {}", WORKER_THREAD_NAME);
        Ok(Self {
            inner: Inner::Thread { done },
        })
    }

    /// Human readable identity for logs and the scrollback
    pub fn describe(&self) -> String {
        match &self.inner {
            Inner::Process { pid: Some(pid), .. } => format!("process {}", pid),
            Inner::Process { pid: None, .. } => "process (exited)".to_string(),
            Inner::Thread { .. } => format!("thread {}", WORKER_THREAD_NAME),
        }
    }

    /// Wait at most `timeout` for the worker to finish.
    ///
    /// The stop signal must already be set. On timeout a worker process gets a
    /// best-effort kill; a worker thread cannot be killed and is left detached.
    pub async fn join(self, timeout: Duration) -> Result<WorkerExit, SupervisorError> {
        let name = self.describe();

        match self.inner {
            Inner::Process { mut child, .. } => {
                match tokio::time::timeout(timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::info!("Worker {} exited: {}", name, status);
                        Ok(WorkerExit::Process {
                            code: status.code(),
                        })
                    }
                    Ok(Err(e)) => Err(SupervisorError::Wait(e)),
                    Err(_) => {
                        tracing::warn!("Worker {} still running after {:?}, killing it", name, timeout);
                        if let Err(e) = child.start_kill() {
                            tracing::warn!("Could not kill worker {}: {}", name, e);
                        }
                        Err(SupervisorError::ShutdownTimeout(timeout))
                    }
                }
            }
            Inner::Thread { done } => match tokio::time::timeout(timeout, done).await {
                Ok(Ok(outcome)) => {
                    tracing::info!("Worker {} finished: {:?}", name, outcome);
                    Ok(WorkerExit::Thread(outcome))
                }
                Ok(Err(_)) => Err(SupervisorError::ThreadPanicked),
                Err(_) => {
                    tracing::warn!("Worker {} still running after {:?}, leaving it detached", name, timeout);
                    Err(SupervisorError::ShutdownTimeout(timeout))
                }
            },
        }
    }
}

/// Outbound channel -> control frames on the child's stdin.
///
/// Once the stop signal is seen, queued commands are dropped and a `Stop`
/// frame is the last thing written.
async fn pump_outbound(mut stdin: ChildStdin, mut outbound: OutboundReceiver, stop: StopSignal) {
    loop {
        tokio::select! {
            biased;
            _ = stop.wait() => break,
            message = outbound.recv() => match message {
                Some(message) => {
                    let frame = ControlFrame::Command(message);
                    if let Err(e) = wire::write_control(&mut stdin, &frame).await {
                        tracing::warn!("Could not forward command to worker: {}", e);
                        return;
                    }
                }
                None => break,
            },
        }
    }

    if let Err(e) = wire::write_control(&mut stdin, &ControlFrame::Stop).await {
        tracing::debug!("Worker stdin already closed: {}", e);
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Closing worker stdin failed: {}", e);
    }
}

/// Chunk frames on the child's stdout -> inbound channel.
///
/// An end of stream while the session is still running means the worker died.
async fn pump_inbound(mut stdout: ChildStdout, inbound: InboundSender, stop: StopSignal) {
    let mut fatal_seen = false;

    let ended = loop {
        match wire::read_chunk(&mut stdout).await {
            Ok(Some(chunk)) => {
                fatal_seen |= chunk.kind().is_fatal();
                if inbound.send(chunk).is_err() {
                    tracing::debug!("Inbound channel closed - stopping chunk pump");
                    return;
                }
            }
            Ok(None) => break "output stream closed".to_string(),
            Err(e) => {
                tracing::error!("Worker output could not be decoded: {}", e);
                break e.to_string();
            }
        }
    };

    if stop.is_set() || fatal_seen {
        tracing::debug!("Worker output ended ({})", ended);
        return;
    }

    tracing::error!("Worker exited unexpectedly: {}", ended);
    let _ = inbound.send(InboundChunk::worker_exited(ended));
}
