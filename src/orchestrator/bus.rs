//! Progress fan-out to zero or more observers.
//!
//! Publishing never blocks and never fails: with no subscribers the frame is dropped,
//! and a subscriber that falls more than the channel capacity behind observes
//! `RecvError::Lagged(n)` and skips the `n` oldest frames. Subscribers only see frames
//! published after they subscribe.

use crate::model::ProgressFrame;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressFrame>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, frame: ProgressFrame) {
        tracing::debug!(
            run_id = frame.run_id,
            sequence = frame.sequence,
            event = frame.event.kind(),
            observers = self.tx.receiver_count(),
            "progress"
        );
        let _ = self.tx.send(frame);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressFrame> {
        self.tx.subscribe()
    }
}
