// Bounded frame handoff between the writing caller and the encoder worker.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};

use super::frame::Frame;

/// What `enqueue` does when the queue is at capacity.
///
/// Fixed per session at open time. `Block` suspends the caller until the
/// worker frees a slot — the channel send itself is the rate limiter.
/// `Fail` returns [`EnqueueError::QueueFull`] immediately so the caller
/// can drop at the source instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    Block,
    Fail,
}

impl Default for BackpressureMode {
    fn default() -> Self {
        BackpressureMode::Block
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// Capacity reached in `Fail` mode; the frame was not accepted.
    #[error("encode queue is full")]
    QueueFull,
    /// The worker side is gone (queue closed or worker dead).
    #[error("encode queue is closed")]
    Closed,
}

/// Producer half of the bounded FIFO between caller and worker.
///
/// Frames are handed over in submission order and never dropped once
/// accepted: closing the queue detaches the sender, and the receiver
/// still drains every in-flight frame before it observes the close.
pub struct EncodeQueue {
    tx: Option<Sender<Frame>>,
    mode: BackpressureMode,
    capacity: usize,
}

impl EncodeQueue {
    /// Create a queue with the given capacity, returning the producer
    /// half and the receiver the worker will drain.
    pub fn bounded(capacity: usize, mode: BackpressureMode) -> (Self, FrameReceiver) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx: Some(tx),
                mode,
                capacity,
            },
            FrameReceiver { rx },
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> BackpressureMode {
        self.mode
    }

    /// Hand a frame to the worker, applying the session's backpressure
    /// policy. On `Err` the caller keeps logical ownership — the frame
    /// was not accepted and will never be reported on.
    pub fn enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        let Some(tx) = &self.tx else {
            return Err(EnqueueError::Closed);
        };
        match self.mode {
            BackpressureMode::Block => tx.send(frame).map_err(|_| EnqueueError::Closed),
            BackpressureMode::Fail => tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => EnqueueError::QueueFull,
                TrySendError::Disconnected(_) => EnqueueError::Closed,
            }),
        }
    }

    /// Close the queue. Blocked and future enqueues fail; frames already
    /// accepted remain in the channel for the worker to flush.
    pub fn close(&mut self) {
        self.tx.take();
    }
}

/// Consumer half, owned by the worker thread.
pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

impl FrameReceiver {
    /// Next frame in submission order, blocking while the queue is open
    /// and empty. Returns `None` only once the queue is closed *and*
    /// every accepted frame has been handed out.
    pub fn dequeue(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> Frame {
        Frame::new(id, 2, 2, vec![0; 16])
    }

    #[test]
    fn fail_mode_reports_full() {
        let (queue, rx) = EncodeQueue::bounded(1, BackpressureMode::Fail);
        queue.enqueue(frame(0)).unwrap();
        assert_eq!(queue.enqueue(frame(1)), Err(EnqueueError::QueueFull));
        // Draining one slot makes room again.
        assert_eq!(rx.dequeue().unwrap().id, 0);
        queue.enqueue(frame(1)).unwrap();
    }

    #[test]
    fn close_flushes_accepted_frames() {
        let (mut queue, rx) = EncodeQueue::bounded(4, BackpressureMode::Fail);
        queue.enqueue(frame(0)).unwrap();
        queue.enqueue(frame(1)).unwrap();
        queue.close();

        assert_eq!(queue.enqueue(frame(2)), Err(EnqueueError::Closed));
        assert_eq!(rx.dequeue().unwrap().id, 0);
        assert_eq!(rx.dequeue().unwrap().id, 1);
        assert!(rx.dequeue().is_none());
    }

    #[test]
    fn dequeue_sees_close_when_empty() {
        let (mut queue, rx) = EncodeQueue::bounded(2, BackpressureMode::Block);
        queue.close();
        assert!(rx.dequeue().is_none());
    }
}
