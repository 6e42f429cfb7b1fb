// Serial worker loop
//
// Owns the serial device for its whole life. Each iteration:
// 1. takes at most one outbound message (non-blocking) and writes it
// 2. checks the device and forwards whatever is available as one chunk
// 3. sleeps for the idle interval
// until the stop signal is seen. Read/write failures are logged and
// swallowed; the next iteration is the retry.

use crate::channel::{InboundSender, OutboundReceiver, Received, StopSignal, WorkerLink};
use crate::metrics::LinkMetrics;
use crate::models::{ConnectionConfig, InboundChunk};
use crate::services::device::{DeviceError, DeviceOpener, SerialDevice};
use std::sync::Arc;
use std::time::Duration;

/// Default pause between loop iterations
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// Shortest pause the loop will take; a zero sleep would never yield the core
pub const MIN_IDLE_INTERVAL: Duration = Duration::from_millis(1);

/// How a worker run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The device never opened; the error was reported in-band
    OpenFailed(DeviceError),
    /// The stop signal was observed after `iterations` loop turns
    Stopped { iterations: u64 },
}

/// The serial worker.
///
/// [`run`](Self::run) is synchronous and blocking; callers put it on a
/// dedicated thread, either in the UI process or in a child process.
pub struct SerialWorker {
    config: ConnectionConfig,
    idle_interval: Duration,
    metrics: Arc<LinkMetrics>,
}

impl SerialWorker {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            metrics: Arc::new(LinkMetrics::new()),
        }
    }

    /// Pause between iterations, never shorter than [`MIN_IDLE_INTERVAL`].
    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        if idle_interval < MIN_IDLE_INTERVAL {
            tracing::warn!(
                "Idle interval {:?} raised to {:?}",
                idle_interval,
                MIN_IDLE_INTERVAL
            );
        }
        self.idle_interval = idle_interval.max(MIN_IDLE_INTERVAL);
        self
    }

    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    pub fn with_metrics(mut self, metrics: Arc<LinkMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<LinkMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Open the device and pump both directions until `stop` is set.
    pub fn run(&self, opener: &dyn DeviceOpener, link: WorkerLink, stop: &StopSignal) -> WorkerOutcome {
        let WorkerLink {
            mut outbound,
            inbound,
        } = link;

        let device = match opener.open(&self.config) {
            Ok(device) => device,
            Err(e) => {
                tracing::error!("Serial worker could not open device: {}", e);
                if inbound.send(InboundChunk::open_failed(&e)).is_err() {
                    tracing::warn!("Open failure could not be reported - inbound channel closed");
                }
                return WorkerOutcome::OpenFailed(e);
            }
        };

        // Released on every exit path below, including unwinding.
        let mut device = DeviceGuard::new(device, &self.config.device);

        if inbound.send(InboundChunk::ready()).is_err() {
            tracing::warn!("Ready notice could not be delivered - inbound channel closed");
        }
        tracing::info!("Serial worker running on {}", self.config.device);

        let mut errors = ErrorRun::default();
        let mut iterations = 0u64;

        while !stop.is_set() {
            iterations += 1;

            if !self.write_pending(device.as_mut(), &mut outbound, stop, &mut errors) {
                break;
            }
            self.read_available(device.as_mut(), &inbound, &mut errors);

            std::thread::sleep(self.idle_interval);
        }

        errors.finish();
        tracing::info!(
            "Serial worker on {} stopping after {} iterations",
            self.config.device,
            iterations
        );
        self.metrics.log_summary("worker");

        drop(device);
        WorkerOutcome::Stopped { iterations }
    }

    /// Step 1. Returns `false` when the stop signal turned up before the write.
    fn write_pending(
        &self,
        device: &mut dyn SerialDevice,
        outbound: &mut OutboundReceiver,
        stop: &StopSignal,
        errors: &mut ErrorRun,
    ) -> bool {
        let message = match outbound.try_recv() {
            Received::Item(message) => message,
            Received::Empty | Received::Closed => return true,
        };

        if stop.is_set() {
            tracing::debug!(
                "Dropping {} byte command received after stop",
                message.len()
            );
            return false;
        }

        match device.write_all(message.as_bytes()) {
            Ok(()) => {
                tracing::trace!("Wrote {} bytes", message.len());
                self.metrics.record_write(message.len());
                errors.clear();
            }
            Err(e) => {
                self.metrics.record_write_error();
                errors.record("write", &e);
            }
        }
        true
    }

    /// Step 2.
    fn read_available(
        &self,
        device: &mut dyn SerialDevice,
        inbound: &InboundSender,
        errors: &mut ErrorRun,
    ) {
        let available = match device.bytes_available() {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                self.metrics.record_read_error();
                errors.record("poll", &e);
                return;
            }
        };

        match device.read_available(available) {
            Ok(bytes) if bytes.is_empty() => {
                tracing::trace!("Device announced {} bytes but read none", available);
            }
            Ok(bytes) => {
                self.metrics.record_read(bytes.len());
                errors.clear();
                if inbound.send(InboundChunk::data(bytes)).is_err() {
                    tracing::debug!("Inbound channel closed - discarding chunk");
                }
            }
            Err(e) => {
                self.metrics.record_read_error();
                errors.record("read", &e);
            }
        }
    }
}

/// Owns the open device and logs its release.
struct DeviceGuard<'a> {
    device: Box<dyn SerialDevice>,
    name: &'a str,
}

impl<'a> DeviceGuard<'a> {
    fn new(device: Box<dyn SerialDevice>, name: &'a str) -> Self {
        Self { device, name }
    }

    fn as_mut(&mut self) -> &mut dyn SerialDevice {
        self.device.as_mut()
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        tracing::info!("Releasing serial device {}", self.name);
    }
}

/// Tracks consecutive I/O failures so a dead device does not flood the log.
#[derive(Default)]
struct ErrorRun {
    count: u64,
}

impl ErrorRun {
    fn record(&mut self, op: &str, error: &std::io::Error) {
        self.count += 1;
        if self.count == 1 {
            tracing::warn!("Serial {} failed (ignored): {}", op, error);
        } else {
            tracing::debug!("Serial {} failed again ({} in a row): {}", op, self.count, error);
        }
    }

    fn clear(&mut self) {
        if self.count > 1 {
            tracing::info!("Serial I/O recovered after {} consecutive failures", self.count);
        }
        self.count = 0;
    }

    fn finish(&mut self) {
        if self.count > 1 {
            tracing::warn!("Serial I/O still failing at shutdown ({} in a row)", self.count);
        }
    }
}
