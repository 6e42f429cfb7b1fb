// Shared fixtures for the integration tests: a scripted serial device and a
// renderer that records everything the controller draws.
#![allow(dead_code)]

use atterm::models::ConnectionConfig;
use atterm::services::{DeviceError, DeviceOpener, SerialDevice};
use atterm::ui::Renderer;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct ProbeInner {
    writes: Mutex<Vec<Vec<u8>>>,
    reads: Mutex<VecDeque<Vec<u8>>>,
    poll_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    writes_started: AtomicUsize,
    fail_writes: AtomicBool,
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Test-side view of the scripted device: feed reads, inspect writes.
#[derive(Clone, Default)]
pub struct DeviceProbe {
    inner: Arc<ProbeInner>,
}

impl DeviceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the device will report on a later poll (one chunk per call)
    pub fn push_read(&self, bytes: &[u8]) {
        self.inner.reads.lock().unwrap().push_back(bytes.to_vec());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every idle poll block for `delay`, like a real read timeout
    pub fn set_poll_delay(&self, delay: Duration) {
        *self.inner.poll_delay.lock().unwrap() = delay;
    }

    /// Make every write block for `delay` before it completes
    pub fn set_write_delay(&self, delay: Duration) {
        *self.inner.write_delay.lock().unwrap() = delay;
    }

    /// Writes entered so far, finished or not
    pub fn writes_started(&self) -> usize {
        self.inner.writes_started.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

pub struct ScriptedDevice {
    probe: DeviceProbe,
}

impl SerialDevice for ScriptedDevice {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let next = self.probe.inner.reads.lock().unwrap().front().map(Vec::len);
        match next {
            Some(n) => Ok(n),
            None => {
                let delay = *self.probe.inner.poll_delay.lock().unwrap();
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                Ok(0)
            }
        }
    }

    fn read_available(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut reads = self.probe.inner.reads.lock().unwrap();
        match reads.pop_front() {
            Some(mut chunk) if chunk.len() > max => {
                let rest = chunk.split_off(max);
                reads.push_front(rest);
                Ok(chunk)
            }
            Some(chunk) => Ok(chunk),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.probe.inner.writes_started.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe.inner.write_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.probe.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.probe.inner.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.probe.inner.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens [`ScriptedDevice`]s, or fails the way a real port would.
pub struct ScriptedOpener {
    probe: DeviceProbe,
    failure: Option<String>,
}

impl ScriptedOpener {
    pub fn new(probe: &DeviceProbe) -> Self {
        Self {
            probe: probe.clone(),
            failure: None,
        }
    }

    pub fn failing(probe: &DeviceProbe, reason: &str) -> Self {
        Self {
            probe: probe.clone(),
            failure: Some(reason.to_string()),
        }
    }
}

impl DeviceOpener for ScriptedOpener {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialDevice>, DeviceError> {
        if let Some(reason) = &self.failure {
            return Err(DeviceError::Open {
                device: config.device.clone(),
                reason: reason.clone(),
            });
        }

        self.probe.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDevice {
            probe: self.probe.clone(),
        }))
    }
}

/// Renderer that keeps every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub lines: Vec<String>,
    pub input: String,
    pub status: String,
    pub input_enabled: bool,
}

impl RecordingRenderer {
    pub fn type_input(&mut self, text: &str) {
        self.input = text.to_string();
    }
}

impl Renderer for RecordingRenderer {
    fn append_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }
}

pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::new("COM-TEST", 9600).with_poll_timeout(Duration::from_millis(20))
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
