//! Integration tests for the worker process boundary
//!
//! These spawn the real `atterm worker` binary and talk to it through the
//! supervisor's pipe pumps. No serial hardware is needed: the tests only use
//! device names that cannot be opened.

use atterm::channel::{Received, StopSignal, channel_pair};
use atterm::models::{ChunkKind, ConnectionConfig, InboundChunk};
use atterm::services::worker_process::EXIT_OPEN_FAILED;
use atterm::services::{WorkerCommand, WorkerExit, WorkerHandle};
use std::time::Duration;
use tokio_test::assert_ok;

#[cfg(windows)]
const MISSING_DEVICE: &str = "COM250";
#[cfg(not(windows))]
const MISSING_DEVICE: &str = "/dev/atterm-missing-device";

const PROCESS_TIMEOUT: Duration = Duration::from_secs(10);

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_atterm")).with_idle_interval(Duration::from_millis(1))
}

async fn next_chunk(inbound: &mut atterm::channel::InboundReceiver) -> InboundChunk {
    match inbound.recv_timeout(PROCESS_TIMEOUT).await {
        Received::Item(chunk) => chunk,
        other => panic!("expected a chunk from the worker process, got {:?}", other),
    }
}

#[tokio::test]
async fn test_open_failure_crosses_the_process_boundary() {
    let (mut ui, link) = channel_pair();
    let stop = StopSignal::new();
    let config = ConnectionConfig::new(MISSING_DEVICE, 9600).with_poll_timeout(Duration::from_millis(20));

    let handle = WorkerHandle::spawn_process(&worker_command(), &config, link, &stop).unwrap();
    assert!(handle.describe().starts_with("process"));

    let chunk = next_chunk(&mut ui.inbound).await;
    assert_eq!(chunk.kind(), ChunkKind::OpenFailed);
    let text = String::from_utf8_lossy(chunk.bytes()).to_string();
    assert!(text.starts_with("[SYSTEM] ERROR:"), "unexpected text: {}", text);
    assert!(text.contains(MISSING_DEVICE));

    let exit = assert_ok!(handle.join(PROCESS_TIMEOUT).await);
    assert_eq!(
        exit,
        WorkerExit::Process {
            code: Some(i32::from(EXIT_OPEN_FAILED))
        }
    );

    // The open failure already explains the exit; no second notice follows
    match ui.inbound.recv_timeout(PROCESS_TIMEOUT).await {
        Received::Closed => {}
        other => panic!("expected the inbound channel to close, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_exit_is_reported() {
    let (mut ui, link) = channel_pair();
    let stop = StopSignal::new();
    // A zero baud rate is rejected by the worker before it opens anything
    let config = ConnectionConfig::new(MISSING_DEVICE, 0);

    let handle = WorkerHandle::spawn_process(&worker_command(), &config, link, &stop).unwrap();

    let chunk = next_chunk(&mut ui.inbound).await;
    assert_eq!(chunk.kind(), ChunkKind::WorkerExited);
    assert!(String::from_utf8_lossy(chunk.bytes()).starts_with("[SYSTEM] WORKER EXITED:"));

    let exit = assert_ok!(handle.join(PROCESS_TIMEOUT).await);
    assert_eq!(exit, WorkerExit::Process { code: Some(1) });
}

#[tokio::test]
async fn test_zero_idle_interval_is_rejected() {
    let (mut ui, link) = channel_pair();
    let stop = StopSignal::new();
    let config = ConnectionConfig::new(MISSING_DEVICE, 9600);
    let command = WorkerCommand::new(env!("CARGO_BIN_EXE_atterm")).with_idle_interval(Duration::ZERO);

    let handle = WorkerHandle::spawn_process(&command, &config, link, &stop).unwrap();

    // Refused before the device is touched: no open failure, just the exit
    let chunk = next_chunk(&mut ui.inbound).await;
    assert_eq!(chunk.kind(), ChunkKind::WorkerExited);

    let exit = assert_ok!(handle.join(PROCESS_TIMEOUT).await);
    assert_eq!(exit, WorkerExit::Process { code: Some(1) });
}

#[tokio::test]
async fn test_stop_before_any_output_exits_quietly() {
    let (mut ui, link) = channel_pair();
    let stop = StopSignal::new();
    let config = ConnectionConfig::new(MISSING_DEVICE, 9600);

    // Stopped up front: the worker still reports its open failure, but the
    // supervisor never invents an exit notice for a stopped session
    stop.set();
    let handle = WorkerHandle::spawn_process(&worker_command(), &config, link, &stop).unwrap();
    assert_ok!(handle.join(PROCESS_TIMEOUT).await);

    loop {
        match ui.inbound.recv_timeout(PROCESS_TIMEOUT).await {
            Received::Item(chunk) => assert_ne!(chunk.kind(), ChunkKind::WorkerExited),
            Received::Closed => break,
            Received::Empty => panic!("inbound channel never closed"),
        }
    }
}

#[test]
fn test_missing_program_fails_to_spawn() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let (_ui, link) = channel_pair();
    let stop = StopSignal::new();
    let command = WorkerCommand::new("/nonexistent/atterm-worker-binary");
    let config = ConnectionConfig::new(MISSING_DEVICE, 9600);

    let result = WorkerHandle::spawn_process(&command, &config, link, &stop);
    assert!(result.is_err());
}
