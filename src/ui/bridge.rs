// Bridge - relays inbound chunks from the worker into the Slint event loop
//
// Runs as a tokio task in the UI process. It never touches rendering state:
// every chunk is handed to a UiNotifier, which schedules the actual update on
// the event loop thread. The inbound channel is polled with a short bounded
// wait so the stop signal is noticed promptly, and queued chunks are always
// drained before the stop signal is honoured.

use crate::channel::{InboundReceiver, MessageSender, Received, StopSignal};
use crate::metrics::LinkMetrics;
use crate::models::InboundChunk;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default bounded wait on the inbound channel
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The UI event loop can no longer accept notifications
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("UI event loop is not accepting notifications: {0}")]
pub struct NotifyError(pub String);

/// Asynchronous notification mechanism of the UI event loop.
///
/// `notify` must not block and must not render; it only schedules work for
/// the event loop's next turn.
pub trait UiNotifier: Send + 'static {
    fn notify(&self, chunk: InboundChunk) -> Result<(), NotifyError>;
}

/// A plain channel works as an event loop stand-in (headless runs and tests)
impl UiNotifier for MessageSender<InboundChunk> {
    fn notify(&self, chunk: InboundChunk) -> Result<(), NotifyError> {
        self.send(chunk).map_err(|e| NotifyError(e.to_string()))
    }
}

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// Stop signal seen with the channel idle
    Stopped,
    /// The worker side is gone and every chunk was relayed
    ChannelClosed,
    /// The event loop refused a notification
    EventLoopGone,
}

pub struct Bridge<N: UiNotifier> {
    inbound: InboundReceiver,
    stop: StopSignal,
    notifier: N,
    poll_interval: Duration,
    metrics: Arc<LinkMetrics>,
}

impl<N: UiNotifier> Bridge<N> {
    pub fn new(inbound: InboundReceiver, stop: StopSignal, notifier: N) -> Self {
        Self {
            inbound,
            stop,
            notifier,
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: Arc::new(LinkMetrics::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<LinkMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Relay until stopped, closed, or the event loop goes away.
    pub async fn run(mut self) -> BridgeExit {
        tracing::debug!("Bridge started (poll {:?})", self.poll_interval);

        let exit = loop {
            match self.inbound.recv_timeout(self.poll_interval).await {
                Received::Item(chunk) => {
                    tracing::trace!("Relaying {:?}", chunk);
                    if let Err(e) = self.notifier.notify(chunk) {
                        self.metrics.record_relay_failure();
                        tracing::warn!("Bridge stopping: {}", e);
                        break BridgeExit::EventLoopGone;
                    }
                    self.metrics.record_relay();
                }
                Received::Closed => break BridgeExit::ChannelClosed,
                Received::Empty => {
                    if self.stop.is_set() {
                        break BridgeExit::Stopped;
                    }
                }
            }
        };

        tracing::info!("Bridge exited: {:?}", exit);
        self.metrics.log_summary("bridge");
        exit
    }

    /// Run the bridge as a task on `runtime`
    pub fn spawn(self, runtime: &Handle) -> JoinHandle<BridgeExit> {
        runtime.spawn(self.run())
    }
}
