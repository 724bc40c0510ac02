//! Background worker for partseg segmentation.
//!
//! Runs one `SegmentationAlgorithm::run` call, or a whole
//! `SegmentationPipeline`, on a dedicated thread and streams its progress
//! back over a channel. The engine itself is
//! synchronous; this crate keeps the caller's thread (typically a UI event
//! loop) free while a calculation runs.
//!
//! Message protocol, in order:
//! - any number of [`WorkerMessage::Progress`], one per reported phase
//! - exactly one [`WorkerMessage::Finished`] carrying the result or error
//!
//! A panic inside the engine is caught on the worker thread and reported as
//! [`WorkerError::Panicked`] instead of tearing down the process.
//! Cancellation is cooperative: dropping the [`WorkerHandle`] stops
//! listening, the calculation still runs to completion and its messages
//! are discarded.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use partseg_core::{
    Image, Labels, Mask, PipelineResult, SegmentationAlgorithm, SegmentationError,
    SegmentationInput, SegmentationPipeline, SegmentationResult,
};
use serde::{Deserialize, Serialize};

/// Errors reported by a worker.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum WorkerError {
    /// The engine rejected its input or parameters.
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    /// The algorithm description could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine panicked; the payload message if it had one.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The worker thread could not be started.
    #[error("failed to start worker thread: {0}")]
    Spawn(String),

    /// The worker went away without sending a result.
    #[error("worker disconnected before finishing")]
    Disconnected,
}

/// One message from the worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerMessage<T = SegmentationResult> {
    /// A phase started.
    Progress { phase: String, step: usize },
    /// The calculation ended. Always the last message.
    Finished(Result<T, WorkerError>),
}

/// Receiving end of a running calculation.
#[derive(Debug)]
pub struct WorkerHandle<T = SegmentationResult> {
    receiver: Receiver<WorkerMessage<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T> WorkerHandle<T> {
    /// Block for the next message.
    ///
    /// Returns `None` once the worker is gone and every message was read.
    #[must_use]
    pub fn recv(&self) -> Option<WorkerMessage<T>> {
        self.receiver.recv().ok()
    }

    /// Next message if one is waiting.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] once the worker is gone and
    /// every message was read.
    pub fn try_recv(&self) -> Result<Option<WorkerMessage<T>>, WorkerError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Block until the calculation finishes, discarding progress messages.
    ///
    /// # Errors
    ///
    /// Returns the worker's error, or [`WorkerError::Disconnected`] if the
    /// thread ended without a result.
    pub fn wait(mut self) -> Result<T, WorkerError> {
        let outcome = loop {
            match self.receiver.recv() {
                Ok(WorkerMessage::Progress { .. }) => {}
                Ok(WorkerMessage::Finished(result)) => break result,
                Err(_) => break Err(WorkerError::Disconnected),
            }
        };
        if let Some(thread) = self.thread.take() {
            // Engine panics are caught inside the thread, so joining only
            // waits for it to exit.
            let _ = thread.join();
        }
        outcome
    }

    /// A handle whose only message is an immediate result.
    fn finished(result: Result<T, WorkerError>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(WorkerMessage::Finished(result));
        Self {
            receiver,
            thread: None,
        }
    }
}

/// Run `algorithm` on `image` on a new thread.
///
/// `exclusion`, if given, marks voxels already claimed by an earlier
/// segmentation and must match the spatial shape of `image`.
#[must_use]
pub fn spawn(
    image: Image,
    exclusion: Option<Labels>,
    algorithm: SegmentationAlgorithm,
) -> WorkerHandle {
    let name = algorithm.name();
    spawn_job(move |report| {
        let input = SegmentationInput::new(&image);
        let input = match &exclusion {
            Some(exclusion) => input.with_exclusion(exclusion.view()),
            None => input,
        };
        algorithm.run(&input, report)
    })
    .unwrap_or_else(|e| {
        log::warn!("could not start worker for {name}: {e}");
        WorkerHandle::finished(Err(e))
    })
}

/// Like [`spawn`], with the algorithm given as JSON.
///
/// A description that does not parse never starts a thread: the handle
/// immediately yields [`WorkerError::InvalidConfig`].
#[must_use]
pub fn spawn_json(image: Image, exclusion: Option<Labels>, config_json: &str) -> WorkerHandle {
    match serde_json::from_str::<SegmentationAlgorithm>(config_json) {
        Ok(algorithm) => spawn(image, exclusion, algorithm),
        Err(e) => WorkerHandle::finished(Err(WorkerError::InvalidConfig(format!(
            "failed to parse algorithm: {e}"
        )))),
    }
}

/// Run `pipeline` on `image` on a new thread.
///
/// `mask`, if given, confines the pipeline's first step and must match the
/// spatial shape of `image`. Progress steps run on across the pipeline's
/// steps.
#[must_use]
pub fn spawn_pipeline(
    image: Image,
    mask: Option<Mask>,
    pipeline: SegmentationPipeline,
) -> WorkerHandle<PipelineResult> {
    let steps = pipeline.steps.len();
    spawn_job(move |report| pipeline.run(&image, mask.as_ref().map(Mask::view), report))
        .unwrap_or_else(|e| {
            log::warn!("could not start worker for a {steps}-step pipeline: {e}");
            WorkerHandle::finished(Err(e))
        })
}

type Job<T> = dyn FnOnce(&mut dyn FnMut(&str, usize)) -> Result<T, SegmentationError> + Send;

/// Start `job` on a named thread wired to a fresh channel.
fn spawn_job<T, F>(job: F) -> Result<WorkerHandle<T>, WorkerError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn FnMut(&str, usize)) -> Result<T, SegmentationError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let job: Box<Job<T>> = Box::new(job);
    let thread = thread::Builder::new()
        .name("partseg-worker".into())
        .spawn(move || handle_job(job, &sender))
        .map_err(|e| WorkerError::Spawn(e.to_string()))?;
    Ok(WorkerHandle {
        receiver,
        thread: Some(thread),
    })
}

/// Thread body: run the job, forward progress, post exactly one result.
fn handle_job<T>(job: Box<Job<T>>, sender: &Sender<WorkerMessage<T>>) {
    let mut report = |phase: &str, step: usize| {
        // A dropped handle means nobody is listening any more.
        let _ = sender.send(WorkerMessage::Progress {
            phase: phase.to_string(),
            step,
        });
    };

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(&mut report))) {
        Ok(result) => result.map_err(WorkerError::from),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("segmentation worker panicked: {message}");
            Err(WorkerError::Panicked(message))
        }
    };
    if let Err(e) = &outcome {
        log::debug!("segmentation worker failed: {e}");
    }
    let _ = sender.send(WorkerMessage::Finished(outcome));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
