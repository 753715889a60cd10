// One VideoOutputSession per output file: open validates and starts the
// worker, write feeds the bounded queue, check_completed polls resolved
// records, close drains and finalizes.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{EncoderBackend, EncoderKind, Ffmpeg};
use crate::preview::PreviewProducer;

use super::frame::{Frame, PixelFormat};
use super::queue::{BackpressureMode, EncodeQueue, EnqueueError};
use super::tracker::{CompletionRecord, CompletionTracker};
use super::worker::{EncoderWorker, SharedSessionState};

/// Queue depth used when the config does not override it.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Everything needed to open one output session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub encoder: EncoderKind,
    pub output_path: PathBuf,

    #[serde(default)]
    pub pixel_format: PixelFormat,

    /// Bounded queue depth; caps memory and the close() drain time.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Full-queue policy, fixed for the session's lifetime.
    #[serde(default)]
    pub backpressure: BackpressureMode,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl SessionConfig {
    pub fn new(
        width: u32,
        height: u32,
        fps: u32,
        encoder: EncoderKind,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            width,
            height,
            fps,
            encoder,
            output_path: output_path.into(),
            pixel_format: PixelFormat::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressureMode::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("invalid session parameters: {0}")]
    InvalidParameters(String),
    #[error("unsupported encoder '{0}'")]
    UnsupportedEncoder(String),
    #[error("output path '{path}' is not writable: {source}")]
    PathUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not start encoder backend: {0}")]
    BackendStart(#[source] io::Error),
}

impl From<crate::backend::UnsupportedEncoder> for OpenError {
    fn from(e: crate::backend::UnsupportedEncoder) -> Self {
        OpenError::UnsupportedEncoder(e.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    /// Frame shape does not match the session's configured dimensions.
    #[error("frame is {actual_width}x{actual_height}, session expects {width}x{height}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    /// Buffer length disagrees with the stated dimensions; the frame is
    /// rejected whole, never truncated.
    #[error("pixel buffer is {actual} bytes, {expected} required")]
    InvalidBufferLength { expected: usize, actual: usize },
    /// Queue at capacity (fail-fast mode only).
    #[error("encode queue is full")]
    QueueFull,
    #[error("session is closed")]
    SessionClosed,
    #[error("session faulted on a fatal encoder error")]
    SessionFaulted,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CloseError {
    #[error("session is closed")]
    SessionClosed,
    /// The drain finished but the session had faulted; the output file
    /// is suspect. Completion records remain pollable.
    #[error("session faulted on a fatal encoder error")]
    SessionFaulted,
}

/// Asynchronous frame sink for one output file.
///
/// `write` only queues; encoding happens on the session's worker thread
/// and outcomes surface through [`check_completed`](Self::check_completed).
/// The session owns its queue, tracker, and worker — sessions never
/// share either, so parallelism happens across sessions, not within one.
pub struct VideoOutputSession {
    id: Uuid,
    config: SessionConfig,
    queue: EncodeQueue,
    tracker: Arc<CompletionTracker>,
    worker: EncoderWorker,
    shared: Arc<SharedSessionState>,
    preview: Arc<Mutex<Option<PreviewProducer>>>,
    next_frame_id: u64,
    accepted: u64,
    closed: bool,
}

impl VideoOutputSession {
    /// Validate the config, spawn the ffmpeg backend, and start the
    /// worker. Fails without side effects (beyond touching the output
    /// file) if any parameter is invalid.
    pub fn open(ffmpeg: &Ffmpeg, config: SessionConfig) -> Result<Self, OpenError> {
        validate_config(&config)?;
        probe_output_path(&config)?;
        let backend = ffmpeg
            .spawn_encoder(&config)
            .map_err(OpenError::BackendStart)?;
        Ok(Self::start(config, Box::new(backend)))
    }

    /// Open with a caller-supplied backend. The backend contract is the
    /// collaborator boundary; anything implementing it can sit behind a
    /// session (custom encoders, test doubles).
    pub fn open_with(
        config: SessionConfig,
        backend: Box<dyn EncoderBackend>,
    ) -> Result<Self, OpenError> {
        validate_config(&config)?;
        probe_output_path(&config)?;
        Ok(Self::start(config, backend))
    }

    fn start(config: SessionConfig, backend: Box<dyn EncoderBackend>) -> Self {
        let (queue, rx) = EncodeQueue::bounded(config.queue_capacity, config.backpressure);
        let tracker = Arc::new(CompletionTracker::new());
        let shared = Arc::new(SharedSessionState::default());
        let preview = Arc::new(Mutex::new(None));
        let worker = EncoderWorker::spawn(
            backend,
            rx,
            Arc::clone(&tracker),
            Arc::clone(&shared),
            Arc::clone(&preview),
        );
        let id = Uuid::new_v4();
        info!(
            session = %id,
            width = config.width,
            height = config.height,
            fps = config.fps,
            encoder = %config.encoder,
            output = %config.output_path.display(),
            "opened video output session"
        );
        Self {
            id,
            config,
            queue,
            tracker,
            worker,
            shared,
            preview,
            next_frame_id: 0,
            accepted: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Frames accepted into the queue so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn is_faulted(&self) -> bool {
        self.shared.is_faulted()
    }

    /// Queue one frame for encoding and return its id. The only side
    /// effect is queueing — encoding is asynchronous, and per-frame
    /// failures surface through `check_completed`, never here. In
    /// `Block` mode this call suspends while the queue is full.
    pub fn write(
        &mut self,
        pixel_data: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<u64, WriteError> {
        if self.closed {
            return Err(WriteError::SessionClosed);
        }
        if self.shared.is_faulted() {
            return Err(WriteError::SessionFaulted);
        }
        if (width, height) != (self.config.width, self.config.height) {
            return Err(WriteError::InvalidDimensions {
                width: self.config.width,
                height: self.config.height,
                actual_width: width,
                actual_height: height,
            });
        }
        let expected = self.config.pixel_format.buffer_len(width, height);
        if pixel_data.len() != expected {
            return Err(WriteError::InvalidBufferLength {
                expected,
                actual: pixel_data.len(),
            });
        }

        let id = self.next_frame_id;
        // Register before the handoff so the worker can never resolve an
        // id the tracker has not seen.
        self.tracker.register(id);
        match self.queue.enqueue(Frame::new(id, width, height, pixel_data)) {
            Ok(()) => {
                self.next_frame_id += 1;
                self.accepted += 1;
                Ok(id)
            }
            Err(EnqueueError::QueueFull) => {
                self.tracker.unregister(id);
                Err(WriteError::QueueFull)
            }
            Err(EnqueueError::Closed) => {
                // Receiver gone means the worker died out from under us.
                self.tracker.unregister(id);
                self.shared.set_faulted();
                Err(WriteError::SessionFaulted)
            }
        }
    }

    /// Non-blocking poll: every record resolved since the previous call,
    /// in submission order, each reported exactly once. Still usable
    /// after `close` to collect the final records.
    pub fn check_completed(&self) -> Vec<CompletionRecord> {
        self.tracker.take_resolved()
    }

    /// Mirror every subsequently encoded frame into `producer`'s ring.
    /// Replaces any previously attached channel.
    pub fn attach_preview(&self, producer: PreviewProducer) {
        let mut guard = self.preview.lock().unwrap();
        if guard.is_some() {
            warn!(session = %self.id, "replacing attached preview channel");
        }
        *guard = Some(producer);
    }

    /// Detach and return the preview channel, if one is attached.
    pub fn detach_preview(&self) -> Option<PreviewProducer> {
        self.preview.lock().unwrap().take()
    }

    /// Close the queue, drain every accepted frame through the encoder,
    /// and finalize the output container. Blocks for at most the queued
    /// backlog; on return exactly one record per accepted frame exists
    /// (reported or pollable).
    pub fn close(&mut self) -> Result<(), CloseError> {
        if self.closed {
            return Err(CloseError::SessionClosed);
        }
        self.closed = true;
        self.queue.close();
        self.worker.join();
        // Producer drop marks the ring closed for its readers.
        self.preview.lock().unwrap().take();
        let faulted = self.shared.is_faulted();
        info!(
            session = %self.id,
            accepted = self.accepted,
            faulted,
            "closed video output session"
        );
        if faulted {
            Err(CloseError::SessionFaulted)
        } else {
            Ok(())
        }
    }
}

impl Drop for VideoOutputSession {
    fn drop(&mut self) {
        // Abandoning a session still drains accepted frames rather than
        // discarding them.
        if !self.closed {
            let _ = self.close();
        }
    }
}

fn validate_config(config: &SessionConfig) -> Result<(), OpenError> {
    if config.width == 0 || config.height == 0 {
        return Err(OpenError::InvalidParameters(format!(
            "dimensions must be positive, got {}x{}",
            config.width, config.height
        )));
    }
    if config.fps == 0 {
        return Err(OpenError::InvalidParameters("fps must be positive".into()));
    }
    if config.queue_capacity == 0 {
        return Err(OpenError::InvalidParameters(
            "queue capacity must be positive".into(),
        ));
    }
    Ok(())
}

// Create parent directories and prove the output file is writable up
// front, so a bad path fails open() instead of the first encode.
fn probe_output_path(config: &SessionConfig) -> Result<(), OpenError> {
    let path = &config.output_path;
    let unwritable = |source| OpenError::PathUnwritable {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(unwritable)?;
        }
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map(drop)
        .map_err(unwritable)
}
