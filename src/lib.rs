//! framesink — asynchronous raw-frame video sink.
//!
//! A host application streams raw frames into an encoded output file
//! without blocking its own thread, and a second process can watch a
//! live preview of those frames through a named shared-memory channel:
//!
//! ```no_run
//! use framesink::backend::{EncoderKind, Ffmpeg};
//! use framesink::pipeline::{SessionConfig, VideoOutputSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ffmpeg = Ffmpeg::from_path_env();
//! let config = SessionConfig::new(640, 480, 30, EncoderKind::H264, "/tmp/out.mp4");
//! let mut session = VideoOutputSession::open(&ffmpeg, config)?;
//!
//! let frame = vec![0u8; 640 * 480 * 4];
//! session.write(frame, 640, 480)?;
//! for record in session.check_completed() {
//!     println!("frame {} -> {:?}", record.frame_id, record.status);
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! The two halves are independent: [`pipeline`] is the queue → worker →
//! polled-completion encode path, [`preview`] is the single-writer /
//! multi-reader shared ring, and [`backend`] is the boundary between
//! the pipeline and the external encoder.

pub mod backend;
pub mod config;
pub mod pipeline;
pub mod preview;

pub use backend::{BackendError, EncoderBackend, EncoderKind, Ffmpeg};
pub use pipeline::{
    BackpressureMode, CompletionRecord, FrameStatus, SessionConfig, VideoOutputSession,
};
pub use preview::{ChannelConfig, PreviewProducer, PreviewReader};
