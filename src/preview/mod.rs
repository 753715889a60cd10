//! Cross-process live preview.
//!
//! A producer publishes frames into a named shared-memory ring; any
//! number of readers in other processes attach by name and poll at
//! their own pace. Publishing never blocks on readers, and a reader
//! that falls behind loses frames to wraparound — detectably, via its
//! drop counter — rather than stalling the producer.

mod channel;
mod ring;

pub use channel::{
    ChannelConfig, DEFAULT_SLOT_COUNT, PreviewError, PreviewFrame, PreviewProducer,
    PreviewReader, fit_within,
};
pub use ring::{RING_MAGIC, RING_VERSION, lost_frames};
