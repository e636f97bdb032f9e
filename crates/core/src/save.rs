//! Background document saves
//!
//! Serialization runs on a dedicated thread so pointer handling never waits
//! on it. Only the most recent request matters: a request still queued when
//! a newer one arrives is dropped, and a finished serialization is not
//! written if a newer request is already waiting.

use crate::session::SaveRequest;
use pdf_engine::CodecError;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Destination for serialized document bytes, provided by the host
pub trait DocumentWriter: Send + 'static {
    fn write_document(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<F> DocumentWriter for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send + 'static,
{
    fn write_document(&mut self, bytes: &[u8]) -> io::Result<()> {
        self(bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("failed to write document: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved { generation: u64, bytes: usize },
    /// A newer request replaced this one before it was written
    Superseded { generation: u64 },
    /// Nothing was written; the previous file is untouched
    Failed { generation: u64, error: SaveError },
}

impl SaveOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Saved { generation, .. }
            | Self::Superseded { generation }
            | Self::Failed { generation, .. } => *generation,
        }
    }
}

#[derive(Default)]
struct Queue {
    next_generation: u64,
    pending: Option<(u64, SaveRequest)>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SaveWorker {
    shared: Arc<Shared>,
    outcomes: Receiver<SaveOutcome>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SaveWorker {
    pub fn spawn(writer: impl DocumentWriter) -> io::Result<Self> {
        let shared =
            Arc::new(Shared { queue: Mutex::new(Queue::default()), ready: Condvar::new() });
        let (sender, outcomes) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("annotation-save".into())
            .spawn(move || run(worker_shared, writer, sender))?;

        Ok(Self { shared, outcomes, thread: Some(thread) })
    }

    /// Queue a save and return its generation number.
    ///
    /// Never blocks on serialization.
    pub fn submit(&self, request: SaveRequest) -> u64 {
        let mut queue = self.shared.lock();
        queue.next_generation += 1;
        let generation = queue.next_generation;
        if let Some((replaced, _)) = queue.pending.replace((generation, request)) {
            tracing::debug!(replaced, generation, "queued save superseded");
        }
        drop(queue);
        self.shared.ready.notify_one();
        generation
    }

    pub fn try_outcome(&self) -> Option<SaveOutcome> {
        self.outcomes.try_recv().ok()
    }

    pub fn wait_outcome(&self, timeout: Duration) -> Option<SaveOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        self.shared.lock().stopping = true;
        self.shared.ready.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Worker loop. A queued request is still written after shutdown is
/// requested, so dropping the worker flushes the last save.
fn run(shared: Arc<Shared>, mut writer: impl DocumentWriter, outcomes: Sender<SaveOutcome>) {
    loop {
        let (generation, request) = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.pending.take() {
                    break job;
                }
                if queue.stopping {
                    return;
                }
                queue = shared.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
        };

        let outcome = match request.serialize() {
            Err(err) => {
                tracing::error!(generation, error = %err, "annotation save failed");
                SaveOutcome::Failed { generation, error: err.into() }
            }
            Ok(_) if shared.lock().pending.is_some() => {
                tracing::debug!(generation, "serialized save superseded before write");
                SaveOutcome::Superseded { generation }
            }
            Ok(bytes) => match writer.write_document(&bytes) {
                Ok(()) => {
                    tracing::info!(generation, bytes = bytes.len(), "annotations saved");
                    SaveOutcome::Saved { generation, bytes: bytes.len() }
                }
                Err(err) => {
                    tracing::error!(generation, error = %err, "writing saved document failed");
                    SaveOutcome::Failed { generation, error: err.into() }
                }
            },
        };

        // The host may have stopped listening.
        let _ = outcomes.send(outcome);
    }
}
