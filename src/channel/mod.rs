// Channel pair - the only data path across the isolation boundary
//
// Two independent unbounded FIFO queues, one per direction:
// - outbound: UI controller -> serial worker (command bytes)
// - inbound:  serial worker -> bridge (received chunks)
//
// Sending never blocks. Receiving comes in a non-blocking flavour (for the
// worker loop) and a bounded-wait flavour (for the bridge), so every poller
// gets a chance to look at the stop signal between messages.

pub mod stop;

pub use stop::StopSignal;

use crate::models::{InboundChunk, OutboundMessage};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// The receiving half is gone
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Result of a non-blocking or bounded-wait receive
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    /// A message was dequeued
    Item(T),
    /// Nothing arrived (immediately, or within the wait bound)
    Empty,
    /// Every sender is gone and the queue is drained
    Closed,
}

/// Producer end of a channel
#[derive(Debug)]
pub struct MessageSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> MessageSender<T> {
    /// Enqueue without blocking.
    pub fn send(&self, item: T) -> Result<(), ChannelClosed> {
        self.tx.send(item).map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end of a channel
#[derive(Debug)]
pub struct MessageReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> MessageReceiver<T> {
    /// Dequeue without waiting.
    pub fn try_recv(&mut self) -> Received<T> {
        match self.rx.try_recv() {
            Ok(item) => Received::Item(item),
            Err(mpsc::error::TryRecvError::Empty) => Received::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => Received::Closed,
        }
    }

    /// Dequeue, giving up with [`Received::Empty`] after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received<T> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => Received::Item(item),
            Ok(None) => Received::Closed,
            Err(_) => Received::Empty,
        }
    }

    /// Dequeue, waiting as long as it takes. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Create one unbounded FIFO channel.
pub fn channel<T>() -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessageSender { tx }, MessageReceiver { rx })
}

pub type OutboundSender = MessageSender<OutboundMessage>;
pub type OutboundReceiver = MessageReceiver<OutboundMessage>;
pub type InboundSender = MessageSender<InboundChunk>;
pub type InboundReceiver = MessageReceiver<InboundChunk>;

/// The UI process's ends of the channel pair
#[derive(Debug)]
pub struct UiLink {
    pub outbound: OutboundSender,
    pub inbound: InboundReceiver,
}

/// The worker's ends of the channel pair
#[derive(Debug)]
pub struct WorkerLink {
    pub outbound: OutboundReceiver,
    pub inbound: InboundSender,
}

/// Build both directions at once.
pub fn channel_pair() -> (UiLink, WorkerLink) {
    let (outbound_tx, outbound_rx) = channel();
    let (inbound_tx, inbound_rx) = channel();

    (
        UiLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        WorkerLink {
            outbound: outbound_rx,
            inbound: inbound_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_recv_empty_then_item() {
        let (tx, mut rx) = channel::<u32>();
        assert_eq!(rx.try_recv(), Received::Empty);

        tx.send(7).unwrap();
        assert_eq!(rx.try_recv(), Received::Item(7));
    }

    #[test]
    fn test_fifo_order() {
        let (tx, mut rx) = channel::<u32>();
        for i in 0..100 {
            tx.send(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(rx.try_recv(), Received::Item(i));
        }
    }

    #[test]
    fn test_closed_after_senders_dropped() {
        let (tx, mut rx) = channel::<u32>();
        tx.send(1).unwrap();
        drop(tx);

        // Queued items still drain before Closed is reported
        assert_eq!(rx.try_recv(), Received::Item(1));
        assert_eq!(rx.try_recv(), Received::Closed);
    }

    #[test]
    fn test_send_fails_when_receiver_dropped() {
        let (tx, rx) = channel::<u32>();
        drop(rx);
        assert_eq!(tx.send(1), Err(ChannelClosed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_empty() {
        let (_tx, mut rx) = channel::<u32>();
        let got = rx.recv_timeout(Duration::from_millis(10)).await;
        assert_eq!(got, Received::Empty);
    }

    #[tokio::test]
    async fn test_channel_pair_directions() {
        let (mut ui, mut worker) = channel_pair();

        ui.outbound.send(OutboundMessage::from_command("AT")).unwrap();
        worker
            .inbound
            .send(InboundChunk::data(b"OK".to_vec()))
            .unwrap();

        match worker.outbound.try_recv() {
            Received::Item(msg) => assert_eq!(msg.as_bytes(), b"AT\r\n"),
            other => panic!("expected outbound message, got {:?}", other),
        }
        match ui.inbound.recv_timeout(Duration::from_millis(50)).await {
            Received::Item(chunk) => assert_eq!(chunk.bytes(), b"OK"),
            other => panic!("expected inbound chunk, got {:?}", other),
        }
    }
}
