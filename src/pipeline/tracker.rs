// Per-frame completion bookkeeping shared between the worker (writer)
// and the caller polling check_completed (reader).

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

/// Why a frame did not encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailReason {
    /// The backend rejected this frame; later frames are unaffected.
    Backend(String),
    /// The session faulted before this frame reached the backend.
    SessionFaulted,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailReason::Backend(msg) => write!(f, "backend error: {}", msg),
            FailReason::SessionFaulted => write!(f, "session faulted"),
        }
    }
}

/// Encode outcome of one submitted frame.
///
/// A frame only ever moves `Pending -> Completed` or `Pending -> Failed`;
/// records handed out by [`CompletionTracker::take_resolved`] are past
/// the transition and never revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FrameStatus {
    Pending,
    Completed,
    Failed(FailReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub frame_id: u64,
    pub status: FrameStatus,
}

#[derive(Default)]
struct TrackerInner {
    pending: HashSet<u64>,
    // Resolution order == worker dequeue order == submission order.
    resolved: VecDeque<CompletionRecord>,
}

/// Records the fate of every accepted frame and hands each record out
/// exactly once through a non-blocking poll.
#[derive(Default)]
pub struct CompletionTracker {
    inner: Mutex<TrackerInner>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted frame as pending.
    pub fn register(&self, frame_id: u64) {
        self.inner.lock().unwrap().pending.insert(frame_id);
    }

    /// Forget a frame whose enqueue was rejected after registration.
    pub fn unregister(&self, frame_id: u64) {
        self.inner.lock().unwrap().pending.remove(&frame_id);
    }

    pub fn resolve_completed(&self, frame_id: u64) {
        self.resolve(frame_id, FrameStatus::Completed);
    }

    pub fn resolve_failed(&self, frame_id: u64, reason: FailReason) {
        self.resolve(frame_id, FrameStatus::Failed(reason));
    }

    fn resolve(&self, frame_id: u64, status: FrameStatus) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.pending.remove(&frame_id) {
            // Status transitions are one-way; a second resolve is a bug
            // upstream, not something to overwrite.
            debug!(frame_id, "ignoring resolve for unknown or already-resolved frame");
            return;
        }
        inner.resolved.push_back(CompletionRecord { frame_id, status });
    }

    /// Drain every record resolved since the previous call, in
    /// submission order. Each record is reported exactly once; frames
    /// still pending are not included.
    pub fn take_resolved(&self) -> Vec<CompletionRecord> {
        let mut inner = self.inner.lock().unwrap();
        inner.resolved.drain(..).collect()
    }

    /// Frames accepted but not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_report_exactly_once() {
        let tracker = CompletionTracker::new();
        tracker.register(0);
        tracker.register(1);
        tracker.resolve_completed(0);
        tracker.resolve_failed(1, FailReason::Backend("busy".into()));

        let records = tracker.take_resolved();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].frame_id, 0);
        assert_eq!(records[0].status, FrameStatus::Completed);
        assert_eq!(
            records[1].status,
            FrameStatus::Failed(FailReason::Backend("busy".into()))
        );
        assert!(tracker.take_resolved().is_empty());
    }

    #[test]
    fn pending_frames_are_not_reported() {
        let tracker = CompletionTracker::new();
        tracker.register(7);
        assert!(tracker.take_resolved().is_empty());
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn double_resolve_is_ignored() {
        let tracker = CompletionTracker::new();
        tracker.register(3);
        tracker.resolve_completed(3);
        tracker.resolve_failed(3, FailReason::SessionFaulted);

        let records = tracker.take_resolved();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, FrameStatus::Completed);
    }

    #[test]
    fn unregister_removes_pending() {
        let tracker = CompletionTracker::new();
        tracker.register(9);
        tracker.unregister(9);
        tracker.resolve_completed(9);
        assert!(tracker.take_resolved().is_empty());
        assert_eq!(tracker.pending_count(), 0);
    }
}
