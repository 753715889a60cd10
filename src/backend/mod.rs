//! Encoder backend boundary.
//!
//! The pipeline treats encoding as a synchronous-but-slow call behind
//! [`EncoderBackend`] and always invokes it off the caller's thread.
//! The shipped implementation pipes raw frames into an ffmpeg child
//! process ([`ffmpeg::FfmpegBackend`]); tests substitute their own.

mod ffmpeg;

pub use ffmpeg::{Ffmpeg, FfmpegBackend, build_encode_cmd};

use std::io;

use serde::{Deserialize, Serialize};

use crate::pipeline::Frame;

/// Video codecs the backend supports, the fixed set a session's
/// `encoder` is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    H264,
    Hevc,
    Vp9,
}

impl EncoderKind {
    /// The ffmpeg `-c:v` value for this codec.
    pub fn codec_arg(&self) -> &'static str {
        match self {
            EncoderKind::H264 => "libx264",
            EncoderKind::Hevc => "libx265",
            EncoderKind::Vp9 => "libvpx-vp9",
        }
    }

    pub fn all() -> &'static [EncoderKind] {
        &[EncoderKind::H264, EncoderKind::Hevc, EncoderKind::Vp9]
    }

    /// Parse a user-supplied encoder name.
    pub fn from_name(name: &str) -> Result<Self, UnsupportedEncoder> {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "libx264" => Ok(EncoderKind::H264),
            "hevc" | "h265" | "libx265" => Ok(EncoderKind::Hevc),
            "vp9" | "libvpx-vp9" => Ok(EncoderKind::Vp9),
            _ => Err(UnsupportedEncoder(name.to_string())),
        }
    }
}

impl std::fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderKind::H264 => write!(f, "h264"),
            EncoderKind::Hevc => write!(f, "hevc"),
            EncoderKind::Vp9 => write!(f, "vp9"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unsupported encoder '{0}'")]
pub struct UnsupportedEncoder(pub String);

/// Typed failures at the backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transient refusal; the frame is failed, the session continues.
    #[error("encoder backend busy")]
    Busy,
    /// The backend cannot consume this frame's format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Broken pipe, unwritable output, dead process — unrecoverable for
    /// the whole session.
    #[error("encoder I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Fatal errors fault the session; non-fatal ones fail one frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Io(_))
    }
}

/// One encoder instance bound to one output file.
///
/// `encode` is called once per frame in submission order from a single
/// worker thread. `finish` finalizes the container; it is called at
/// most once, only on clean shutdown.
pub trait EncoderBackend: Send {
    fn encode(&mut self, frame: &Frame) -> Result<(), BackendError>;
    fn finish(&mut self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_names_parse() {
        assert_eq!(EncoderKind::from_name("h264").unwrap(), EncoderKind::H264);
        assert_eq!(EncoderKind::from_name("H265").unwrap(), EncoderKind::Hevc);
        assert_eq!(
            EncoderKind::from_name("libvpx-vp9").unwrap(),
            EncoderKind::Vp9
        );
        assert!(EncoderKind::from_name("av1").is_err());
    }

    #[test]
    fn fatality_split() {
        assert!(!BackendError::Busy.is_fatal());
        assert!(!BackendError::UnsupportedFormat("p010".into()).is_fatal());
        assert!(
            BackendError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).is_fatal()
        );
    }
}
