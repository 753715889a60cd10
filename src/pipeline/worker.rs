// Background encode loop: one thread per session, pulling frames in
// submission order and reporting each outcome through the tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::backend::EncoderBackend;
use crate::preview::PreviewProducer;

use super::queue::FrameReceiver;
use super::tracker::{CompletionTracker, FailReason};

/// State shared between the session handle and its worker thread.
#[derive(Default)]
pub(crate) struct SharedSessionState {
    faulted: AtomicBool,
}

impl SharedSessionState {
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    pub fn set_faulted(&self) {
        self.faulted.store(true, Ordering::Release);
    }
}

/// Handle to a session's encode thread.
pub(crate) struct EncoderWorker {
    handle: Option<JoinHandle<()>>,
}

impl EncoderWorker {
    /// Spawn the loop. It runs until the queue is closed and drained,
    /// then finalizes the backend (unless the session faulted first).
    pub fn spawn(
        mut backend: Box<dyn EncoderBackend>,
        rx: FrameReceiver,
        tracker: Arc<CompletionTracker>,
        shared: Arc<SharedSessionState>,
        preview: Arc<Mutex<Option<PreviewProducer>>>,
    ) -> Self {
        let handle = thread::spawn(move || {
            run_loop(backend.as_mut(), &rx, &tracker, &shared, &preview);
            if shared.is_faulted() {
                debug!("worker exiting without finalize: session faulted");
            } else if let Err(e) = backend.finish() {
                error!(error = %e, "finalizing encoder output failed");
                shared.set_faulted();
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the loop to drain and exit. Bounded by the queue
    /// capacity's worth of encode calls plus finalization.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("encoder worker thread panicked");
            }
        }
    }
}

fn run_loop(
    backend: &mut dyn EncoderBackend,
    rx: &FrameReceiver,
    tracker: &CompletionTracker,
    shared: &SharedSessionState,
    preview: &Mutex<Option<PreviewProducer>>,
) {
    while let Some(frame) = rx.dequeue() {
        if shared.is_faulted() {
            // Fatal error earlier in the stream: resolve the backlog
            // without touching the backend again.
            tracker.resolve_failed(frame.id, FailReason::SessionFaulted);
            continue;
        }

        match backend.encode(&frame) {
            Ok(()) => {
                publish_preview(preview, &frame);
                tracker.resolve_completed(frame.id);
            }
            Err(e) if e.is_fatal() => {
                error!(frame_id = frame.id, error = %e, "fatal encoder error, faulting session");
                shared.set_faulted();
                tracker.resolve_failed(frame.id, FailReason::Backend(e.to_string()));
            }
            Err(e) => {
                warn!(frame_id = frame.id, error = %e, "frame failed to encode");
                tracker.resolve_failed(frame.id, FailReason::Backend(e.to_string()));
            }
        }
    }
}

// Mirror an encoded frame into the preview ring, if one is attached.
// A publish failure detaches the channel rather than disturbing the
// encode stream.
fn publish_preview(preview: &Mutex<Option<PreviewProducer>>, frame: &crate::pipeline::Frame) {
    let mut guard = preview.lock().unwrap();
    if let Some(producer) = guard.as_mut() {
        if let Err(e) = producer.publish(frame) {
            warn!(error = %e, "preview publish failed, detaching channel");
            *guard = None;
        }
    }
}
