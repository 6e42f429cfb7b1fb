//! Services module - everything that runs on the far side of the isolation boundary.
//!
//! Nothing in here knows about Slint. The UI layer only sees the channel
//! endpoints, the [`StopSignal`](crate::channel::StopSignal) and a
//! [`WorkerHandle`] to join at shutdown.
//!
//! # Components
//!
//! - [`SerialWorker`]: the device loop. Opens the port, then alternates
//!   between writing one queued command and forwarding whatever the device has
//!   to offer, until the stop signal is seen. Transient I/O errors are logged
//!   and swallowed; an open failure is reported in-band and ends the run.
//! - [`device`]: the [`SerialDevice`] / [`DeviceOpener`] seam, with the
//!   `serialport` backed implementation used in production.
//! - [`wire`]: length-prefixed frames carrying the channel pair over the
//!   worker process pipes.
//! - [`worker_process`]: `atterm worker` entry point on the child side.
//! - [`WorkerHandle`]: spawns the worker as a process or a thread and joins it
//!   with a bounded wait.
//! - [`start_session`]: wires channels, stop signal and worker together.
//!
//! # Usage Example
//!
//! ```ignore
//! use atterm::services::{start_session, WorkerCommand, WorkerLauncher};
//!
//! let session = start_session(
//!     runtime.handle(),
//!     ConnectionConfig::new("/dev/ttyUSB0", 115_200),
//!     Duration::from_millis(10),
//!     WorkerLauncher::Process(WorkerCommand::current_exe()?),
//! )?;
//!
//! session.outbound.send(OutboundMessage::from_command("AT"))?;
//! // ... later
//! session.stop.set();
//! session.worker.join(Duration::from_secs(1)).await?;
//! ```

pub mod device;
pub mod session;
pub mod supervisor;
pub mod wire;
pub mod worker;
pub mod worker_process;

pub use device::{DeviceError, DeviceOpener, SerialDevice, SerialPortOpener};
pub use session::{Session, WorkerLauncher, start_session};
pub use supervisor::{SupervisorError, WorkerCommand, WorkerExit, WorkerHandle};
pub use wire::{ControlFrame, WireError};
pub use worker::{DEFAULT_IDLE_INTERVAL, MIN_IDLE_INTERVAL, SerialWorker, WorkerOutcome};
pub use worker_process::serve_stdio;
