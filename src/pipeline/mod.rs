//! The asynchronous frame-output pipeline.
//!
//! A [`VideoOutputSession`] owns a bounded [`EncodeQueue`], one worker
//! thread, and a [`CompletionTracker`]: the caller queues raw frames,
//! the worker feeds them to the encoder backend in submission order,
//! and outcomes are collected through a non-blocking poll.

mod frame;
mod queue;
mod session;
mod tracker;
mod worker;

pub use frame::{Frame, PixelFormat};
pub use queue::{BackpressureMode, EncodeQueue, EnqueueError, FrameReceiver};
pub use session::{
    CloseError, DEFAULT_QUEUE_CAPACITY, OpenError, SessionConfig, VideoOutputSession, WriteError,
};
pub use tracker::{CompletionRecord, CompletionTracker, FailReason, FrameStatus};
