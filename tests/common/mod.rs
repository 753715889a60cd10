#![allow(dead_code)] // not every test binary uses every knob

// Shared test double for the encoder backend boundary.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use framesink::backend::{BackendError, EncoderBackend};
use framesink::pipeline::Frame;

/// Scripted failure for one frame id.
#[derive(Clone, Copy)]
pub enum Failure {
    /// Per-frame error; the session keeps going.
    Recoverable,
    /// Faults the whole session.
    Fatal,
}

/// Records every encode call and optionally fails scripted frames.
///
/// A gated mock additionally blocks inside `encode` until the test
/// releases a token, which makes queue-capacity behavior deterministic.
pub struct MockBackend {
    log: Arc<Mutex<Vec<u64>>>,
    finished: Arc<AtomicBool>,
    failures: HashMap<u64, Failure>,
    gate: Option<Receiver<()>>,
    started: Option<Sender<u64>>,
}

/// Test-side controls for a gated [`MockBackend`].
pub struct Gate {
    release: Sender<()>,
    started: Receiver<u64>,
}

impl Gate {
    /// Allow one pending (or future) encode call to proceed.
    pub fn release_one(&self) {
        let _ = self.release.send(());
    }

    pub fn release(&self, n: usize) {
        for _ in 0..n {
            self.release_one();
        }
    }

    /// Block until the worker has entered `encode` for some frame.
    pub fn wait_started(&self) -> u64 {
        self.started.recv().expect("worker never started encoding")
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
            failures: HashMap::new(),
            gate: None,
            started: None,
        }
    }

    /// Handles to observe encode order and finalization from the test.
    pub fn probes(&self) -> (Arc<Mutex<Vec<u64>>>, Arc<AtomicBool>) {
        (Arc::clone(&self.log), Arc::clone(&self.finished))
    }

    pub fn fail_frame(mut self, id: u64, failure: Failure) -> Self {
        self.failures.insert(id, failure);
        self
    }

    /// Make every encode call wait for a token from the returned gate.
    pub fn gated(mut self) -> (Self, Gate) {
        let (release, gate_rx) = channel();
        let (started_tx, started) = channel();
        self.gate = Some(gate_rx);
        self.started = Some(started_tx);
        (
            self,
            Gate {
                release,
                started,
            },
        )
    }
}

impl EncoderBackend for MockBackend {
    fn encode(&mut self, frame: &Frame) -> Result<(), BackendError> {
        if let Some(started) = &self.started {
            let _ = started.send(frame.id);
        }
        if let Some(gate) = &self.gate {
            // Bounded wait so a failed test tears down instead of hanging.
            let _ = gate.recv_timeout(std::time::Duration::from_secs(10));
        }
        match self.failures.get(&frame.id) {
            Some(Failure::Recoverable) => Err(BackendError::Busy),
            Some(Failure::Fatal) => Err(BackendError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output became unwritable",
            ))),
            None => {
                self.log.lock().unwrap().push(frame.id);
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<(), BackendError> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}
