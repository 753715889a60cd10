// Named preview channels: one producer publishing frames into a shared
// ring, any number of readers polling at their own pace.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::pipeline::Frame;

use super::ring::{RingGeometry, RingView, RingWriter, lost_frames};

/// Default ring depth when the channel config does not override it.
pub const DEFAULT_SLOT_COUNT: u32 = 8;

// A reader that loses a race against the writer on the newest slot just
// retries against the fresher cursor; one lap per attempt bounds this.
const READ_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// No channel with this name currently exists.
    #[error("preview channel '{0}' not found")]
    ChannelUnavailable(String),
    /// The producer has closed the channel.
    #[error("preview channel closed by producer")]
    ChannelClosed,
    /// The named file exists but is not a compatible ring.
    #[error("'{0}' is not a valid preview channel")]
    InvalidChannel(String),
    /// Frame payload exceeds the ring's slot capacity.
    #[error("frame of {actual} bytes exceeds slot capacity of {capacity} bytes")]
    FrameTooLarge { actual: usize, capacity: usize },
    /// Frame buffer does not match its stated dimensions.
    #[error("frame buffer is {actual} bytes, dimensions require {expected}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Sizing for a new channel: ring depth plus the largest frame the ring
/// must hold (slot capacity is derived as `max_width * max_height * 4`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub slot_count: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

impl ChannelConfig {
    fn slot_capacity(&self) -> u32 {
        self.max_width * self.max_height * 4
    }
}

/// One frame handed back by [`PreviewReader::read`].
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Ring index of the frame (publish order).
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

fn ring_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("framesink-{name}.ring"))
}

fn validate_name(name: &str) -> Result<(), PreviewError> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(PreviewError::InvalidChannel(name.to_string()));
    }
    Ok(())
}

/// Producer handle for a named channel. Creating it allocates the shared
/// ring; dropping it (or calling [`close`](Self::close)) invalidates the
/// channel for every reader and removes the backing file.
pub struct PreviewProducer {
    name: String,
    path: PathBuf,
    writer: RingWriter,
    capacity: usize,
    closed: bool,
}

impl PreviewProducer {
    /// Create a channel. With `name == None` a unique name is generated,
    /// to be handed to the consuming process out of band.
    pub fn create(name: Option<&str>, config: ChannelConfig) -> Result<Self, PreviewError> {
        let name = match name {
            Some(n) => {
                validate_name(n)?;
                n.to_string()
            }
            None => format!("pv-{}", Uuid::new_v4().simple()),
        };
        let path = ring_path(&name);
        // Truncate rather than fail: a stale ring from a dead producer
        // must not squat on the name.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let geo = RingGeometry::new(config.slot_count.max(2), config.slot_capacity());
        let writer = RingWriter::create(&file, geo)?;
        info!(name = %name, slots = geo.slot_count, "created preview channel");
        Ok(Self {
            name,
            path,
            writer,
            capacity: geo.slot_capacity as usize,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.writer.write_cursor()
    }

    /// Publish one frame into the ring, overwriting the oldest slot.
    /// Never blocks, whether or not any reader is attached. Returns the
    /// frame's ring index.
    pub fn publish(&mut self, frame: &Frame) -> Result<u64, PreviewError> {
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.data.len() != expected {
            return Err(PreviewError::InvalidFrame {
                expected,
                actual: frame.data.len(),
            });
        }
        if frame.data.len() > self.capacity {
            return Err(PreviewError::FrameTooLarge {
                actual: frame.data.len(),
                capacity: self.capacity,
            });
        }
        Ok(self.writer.publish(frame.width, frame.height, &frame.data))
    }

    /// Close the channel for all readers and remove the backing file.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Flag first so readers holding a mapping see the close even
        // after the file disappears.
        self.writer.mark_closed();
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(name = %self.name, error = %e, "could not remove ring file");
        }
        info!(name = %self.name, "closed preview channel");
    }
}

impl Drop for PreviewProducer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read-only handle attached to an existing channel by name.
///
/// `read` is latest-wins: it hands back the newest frame published since
/// the previous call, and accounts frames that aged out of the ring
/// unobserved in [`dropped`](Self::dropped). Closing or dropping a
/// reader affects neither the producer nor other readers.
pub struct PreviewReader {
    name: String,
    view: RingView,
    cursor: u64,
    dropped: u64,
}

impl PreviewReader {
    /// Attach to `name`. The cursor starts at the current write cursor:
    /// a late-joining reader observes only frames published from now on.
    pub fn open(name: &str) -> Result<Self, PreviewError> {
        validate_name(name)?;
        let path = ring_path(name);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PreviewError::ChannelUnavailable(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let view = RingView::open(&file)
            .map_err(|_| PreviewError::InvalidChannel(name.to_string()))?;
        let cursor = view.write_cursor();
        debug!(name, cursor, "attached preview reader");
        Ok(Self {
            name: name.to_string(),
            view,
            cursor,
            dropped: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames lost to ring wraparound before this reader observed them,
    /// cumulative since open.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Poll for the newest unobserved frame, downsized to fit within
    /// `max_width x max_height` if larger (resampled, not re-encoded).
    /// Returns `Ok(None)` when nothing new has been published.
    pub fn read(
        &mut self,
        max_width: u32,
        max_height: u32,
    ) -> Result<Option<PreviewFrame>, PreviewError> {
        if self.view.is_closed() {
            return Err(PreviewError::ChannelClosed);
        }
        for _ in 0..READ_RETRIES {
            let write_cursor = self.view.write_cursor();
            if write_cursor == self.cursor {
                return Ok(None);
            }
            let latest = write_cursor - 1;
            if let Some((width, height, data)) = self.view.read_frame(latest) {
                self.dropped += lost_frames(
                    self.cursor,
                    write_cursor,
                    self.view.geometry().slot_count,
                );
                self.cursor = write_cursor;
                let (w, h, data) = downsize(width, height, data, max_width, max_height);
                return Ok(Some(PreviewFrame {
                    frame_index: latest,
                    width: w,
                    height: h,
                    data,
                }));
            }
            // Lapped mid-copy; retry against the fresher cursor.
        }
        Ok(None)
    }
}

/// Largest size at most `max_w x max_h` with the source aspect ratio.
/// Never upscales. Integer truncation keeps the result inside the bounds.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let w = width as u64;
    let h = height as u64;
    // Same comparison the scaled-size computation has always used:
    // whichever axis overflows its bound more wins.
    let (out_w, out_h) = if w * max_h as u64 > h * max_w as u64 {
        (max_w as u64, (h * max_w as u64 / w).max(1))
    } else {
        ((w * max_h as u64 / h).max(1), max_h as u64)
    };
    (out_w as u32, out_h as u32)
}

fn downsize(
    width: u32,
    height: u32,
    data: Vec<u8>,
    max_w: u32,
    max_h: u32,
) -> (u32, u32, Vec<u8>) {
    let (out_w, out_h) = fit_within(width, height, max_w.max(1), max_h.max(1));
    if (out_w, out_h) == (width, height)
        || data.len() != width as usize * height as usize * 4
    {
        return (width, height, data);
    }
    // Resampling is per-channel and therefore channel-order agnostic, so
    // BGRA data can ride through an Rgba buffer unchanged. from_raw only
    // checks the length, which was verified above.
    let Some(img) = image::RgbaImage::from_raw(width, height, data) else {
        return (width, height, Vec::new());
    };
    let resized = image::imageops::resize(&img, out_w, out_h, image::imageops::FilterType::Triangle);
    (out_w, out_h, resized.into_raw())
}
