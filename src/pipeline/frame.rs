use serde::{Deserialize, Serialize};

/// Pixel layout of the raw buffers a session accepts.
///
/// Both layouts are 4 bytes per pixel; the variant only changes channel
/// order, which matters to the encoder input format and nothing else in
/// the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit BGRA — what Electron/Chromium frame capture produces.
    Bgra,
    /// 8-bit RGBA.
    Rgba,
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::Bgra
    }
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Exact buffer length required for a frame of the given dimensions.
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra => write!(f, "bgra"),
            PixelFormat::Rgba => write!(f, "rgba"),
        }
    }
}

/// One raw video frame travelling through the pipeline.
///
/// The frame exclusively owns its pixel buffer; handing it to the queue
/// moves ownership to the worker, which drops it once the backend has
/// consumed it. `id` is the session-assigned submission index — at a
/// fixed frame rate it doubles as the timestamp order index.
#[derive(Debug)]
pub struct Frame {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(id: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_len_matches_dimensions() {
        assert_eq!(PixelFormat::Bgra.buffer_len(640, 480), 640 * 480 * 4);
        assert_eq!(PixelFormat::Rgba.buffer_len(1, 1), 4);
        assert_eq!(PixelFormat::default(), PixelFormat::Bgra);
    }

    #[test]
    fn pixel_format_display() {
        assert_eq!(PixelFormat::Bgra.to_string(), "bgra");
        assert_eq!(PixelFormat::Rgba.to_string(), "rgba");
    }
}
