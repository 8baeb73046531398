//! Bounded hand-off queue between the ingress adapter and the dispatcher
//!
//! One abstraction, two send disciplines: stream flows block the producer
//! when the queue is saturated (losing stream data is unacceptable), while
//! datagram flows are dropped on a full queue.

use tokio::sync::mpsc;

/// What happens when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Wait for capacity; backpressures new-flow acceptance.
    Blocking,
    /// Drop the item immediately.
    BestEffort,
}

/// Sending half of a bounded flow queue.
pub struct FlowQueue<T> {
    tx: mpsc::Sender<T>,
    mode: SendMode,
}

impl<T> Clone for FlowQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            mode: self.mode,
        }
    }
}

/// Create a bounded queue with the given capacity and send discipline.
pub fn bounded<T>(capacity: usize, mode: SendMode) -> (FlowQueue<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (FlowQueue { tx, mode }, rx)
}

impl<T> FlowQueue<T> {
    /// Hand an item downstream.
    ///
    /// Returns `false` when the item was not accepted: queue full in
    /// best-effort mode, or receiver gone in either mode.
    pub async fn push(&self, item: T) -> bool {
        match self.mode {
            SendMode::Blocking => self.tx.send(item).await.is_ok(),
            SendMode::BestEffort => self.tx.try_send(item).is_ok(),
        }
    }
}
