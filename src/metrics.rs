// Link metrics
//
// Lightweight counters for the serial link, updated from the worker loop and
// the bridge without taking locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one side of the link.
///
/// The worker fills in the device half, the bridge fills in the relay half.
/// Each logs a summary when it exits.
#[derive(Debug)]
pub struct LinkMetrics {
    /// Outbound messages written to the device
    pub commands_written: AtomicU64,

    /// Bytes written to the device
    pub bytes_written: AtomicU64,

    /// Failed device writes (swallowed)
    pub write_errors: AtomicU64,

    /// Non-empty chunks read from the device
    pub chunks_read: AtomicU64,

    /// Bytes read from the device
    pub bytes_read: AtomicU64,

    /// Failed availability checks or reads (swallowed)
    pub read_errors: AtomicU64,

    /// Chunks handed to the UI event loop
    pub chunks_relayed: AtomicU64,

    /// Chunks the event loop would not take
    pub relay_failures: AtomicU64,

    start_time: Instant,
}

/// Plain copy of the counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commands_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub chunks_read: u64,
    pub bytes_read: u64,
    pub read_errors: u64,
    pub chunks_relayed: u64,
    pub relay_failures: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self {
            commands_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            chunks_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            chunks_relayed: AtomicU64::new(0),
            relay_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_write(&self, bytes: usize) {
        self.commands_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay(&self) {
        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_failure(&self) {
        self.relay_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_written: self.commands_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            chunks_relayed: self.chunks_relayed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
        }
    }

    /// Log a one-line summary under the given scope name
    pub fn log_summary(&self, scope: &str) {
        let s = self.snapshot();
        tracing::info!(
            "{} metrics after {:.1}s: tx {} cmds / {} bytes ({} errors), rx {} chunks / {} bytes ({} errors), relayed {} ({} failed)",
            scope,
            self.uptime().as_secs_f64(),
            s.commands_written,
            s.bytes_written,
            s.write_errors,
            s.chunks_read,
            s.bytes_read,
            s.read_errors,
            s.chunks_relayed,
            s.relay_failures
        );
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters() {
        let metrics = LinkMetrics::new();
        metrics.record_write(4);
        metrics.record_write(6);
        metrics.record_write_error();
        metrics.record_read(3);

        let s = metrics.snapshot();
        assert_eq!(s.commands_written, 2);
        assert_eq!(s.bytes_written, 10);
        assert_eq!(s.write_errors, 1);
        assert_eq!(s.chunks_read, 1);
        assert_eq!(s.bytes_read, 3);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(LinkMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_relay();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().chunks_relayed, 1000);
    }
}
