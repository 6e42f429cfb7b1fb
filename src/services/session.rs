use crate::channel::{InboundReceiver, OutboundSender, StopSignal, channel_pair};
use crate::metrics::LinkMetrics;
use crate::models::ConnectionConfig;
use crate::services::device::DeviceOpener;
use crate::services::supervisor::{SupervisorError, WorkerCommand, WorkerHandle};
use crate::services::worker::SerialWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Where to run the Serial Worker for a session
pub enum WorkerLauncher {
    /// Child process running `atterm worker`
    Process(WorkerCommand),
    /// OS thread in this process, talking to devices through the opener
    Thread(Box<dyn DeviceOpener>),
}

impl std::fmt::Debug for WorkerLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerLauncher::Process(command) => f.debug_tuple("Process").field(command).finish(),
            WorkerLauncher::Thread(_) => f.write_str("Thread"),
        }
    }
}

/// Everything the UI side holds for one connection session
#[derive(Debug)]
pub struct Session {
    pub outbound: OutboundSender,
    pub inbound: InboundReceiver,
    pub stop: StopSignal,
    pub worker: WorkerHandle,
    /// Relay counters for the bridge (and the worker, in thread mode)
    pub metrics: Arc<LinkMetrics>,
}

/// Create the channel pair and stop signal, then start the worker behind them.
///
/// # Arguments
/// * `runtime` - tokio runtime that hosts the pipe pumps (process mode)
/// * `config` - connection parameters, fixed for the session
/// * `idle_interval` - pause between worker loop iterations
/// * `launcher` - isolation flavour
pub fn start_session(
    runtime: &Handle,
    config: ConnectionConfig,
    idle_interval: Duration,
    launcher: WorkerLauncher,
) -> Result<Session, SupervisorError> {
    let _guard = runtime.enter();

    let (ui_link, worker_link) = channel_pair();
    let stop = StopSignal::new();
    let metrics = Arc::new(LinkMetrics::new());

    let worker = match launcher {
        WorkerLauncher::Process(command) => {
            let command = command.with_idle_interval(idle_interval);
            WorkerHandle::spawn_process(&command, &config, worker_link, &stop)?
        }
        WorkerLauncher::Thread(opener) => {
            let worker = SerialWorker::new(config)
                .with_idle_interval(idle_interval)
                .with_metrics(Arc::clone(&metrics));
            WorkerHandle::spawn_thread(worker, opener, worker_link, &stop)?
        }
    };

    tracing::info!("Session started with worker {}", worker.describe());

    Ok(Session {
        outbound: ui_link.outbound,
        inbound: ui_link.inbound,
        stop,
        worker,
        metrics,
    })
}
