// Worker process entry point
//
// Runs inside `atterm worker ...`. Stdin carries control frames from the UI,
// stdout carries chunk frames back. Both pipes are adapted onto a local
// channel pair so the Serial Worker loop is the same one the thread mode runs.
// Nothing in this process may write anything else to stdout.

use crate::channel::{InboundReceiver, OutboundSender, StopSignal, channel_pair};
use crate::models::ConnectionConfig;
use crate::services::device::SerialPortOpener;
use crate::services::wire::{self, ControlFrame};
use crate::services::worker::{SerialWorker, WorkerOutcome};
use std::process::ExitCode;
use std::time::Duration;

/// Exit status reported when the device could not be opened
pub const EXIT_OPEN_FAILED: u8 = 2;

/// How long the runtime may spend on leftover pipe tasks after the loop ends
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Serve one session over stdin/stdout and return the process exit status.
pub fn serve_stdio(config: ConnectionConfig, idle_interval: Duration) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Worker could not build its runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Worker process {} serving {} @ {}",
        std::process::id(),
        config.device,
        config.baud_rate
    );

    let outcome = runtime.block_on(serve(config, idle_interval));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Some(WorkerOutcome::Stopped { .. }) => ExitCode::SUCCESS,
        Some(WorkerOutcome::OpenFailed(_)) => ExitCode::from(EXIT_OPEN_FAILED),
        None => ExitCode::FAILURE,
    }
}

async fn serve(config: ConnectionConfig, idle_interval: Duration) -> Option<WorkerOutcome> {
    let (ui_link, worker_link) = channel_pair();
    let stop = StopSignal::new();

    let stdin_task = tokio::spawn(pump_stdin(ui_link.outbound, stop.clone()));
    let stdout_task = tokio::spawn(pump_stdout(ui_link.inbound, stop.clone()));

    let worker_stop = stop.clone();
    let worker = SerialWorker::new(config).with_idle_interval(idle_interval);
    let outcome = match tokio::task::spawn_blocking(move || {
        worker.run(&SerialPortOpener, worker_link, &worker_stop)
    })
    .await
    {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!("Serial worker thread failed: {}", e);
            None
        }
    };

    // The worker dropped its inbound sender, so the stdout pump ends once the
    // queue is flushed.
    if let Err(e) = stdout_task.await {
        tracing::warn!("Stdout pump ended abnormally: {}", e);
    }
    stdin_task.abort();

    outcome
}

/// Control frames -> local outbound channel. Any end of the stream stops the worker.
async fn pump_stdin(outbound: OutboundSender, stop: StopSignal) {
    let mut stdin = tokio::io::stdin();

    loop {
        match wire::read_control(&mut stdin).await {
            Ok(Some(ControlFrame::Command(message))) => {
                if outbound.send(message).is_err() {
                    tracing::debug!("Worker loop gone - ignoring further commands");
                    break;
                }
            }
            Ok(Some(ControlFrame::Stop)) => {
                tracing::info!("Stop frame received");
                break;
            }
            Ok(None) => {
                tracing::info!("Control pipe closed by the UI process");
                break;
            }
            Err(e) => {
                tracing::error!("Control pipe failed: {}", e);
                break;
            }
        }
    }

    stop.set();
}

/// Local inbound channel -> chunk frames on stdout.
async fn pump_stdout(mut inbound: InboundReceiver, stop: StopSignal) {
    let mut stdout = tokio::io::stdout();

    while let Some(chunk) = inbound.recv().await {
        if let Err(e) = wire::write_chunk(&mut stdout, &chunk).await {
            tracing::error!("Chunk pipe failed, stopping worker: {}", e);
            stop.set();
            break;
        }
    }
}
