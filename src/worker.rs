//! The single frame-processing worker.
//!
//! Frames are handed over through a rendezvous channel with `try_send`: a
//! frame is accepted only while the worker is idle and waiting, otherwise it
//! is dropped. Results are delivered to the callback in frame order.

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::aggregate::FrameResult;
use crate::feedback::FeedbackScheduler;
use crate::ingest::FrameInput;
use crate::pipeline::Pipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// The worker was busy; the frame was discarded.
    Dropped,
    Stopped,
}

#[derive(Debug, Default)]
struct WorkerStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub accepted: u64,
    pub dropped: u64,
    pub processed: u64,
    pub failed: u64,
}

pub struct FrameWorker {
    sender: Option<SyncSender<(u64, FrameInput)>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    stopped: Arc<AtomicBool>,
    scheduler: Arc<FeedbackScheduler>,
    next_sequence: u64,
}

impl FrameWorker {
    /// Start the worker thread. `on_result` runs on that thread for every
    /// successfully processed frame.
    pub fn spawn<F>(mut pipeline: Pipeline, mut on_result: F) -> Result<Self>
    where
        F: FnMut(FrameResult) + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<(u64, FrameInput)>(0);
        let stats = Arc::new(WorkerStats::default());
        let stopped = Arc::new(AtomicBool::new(false));
        let scheduler = Arc::clone(pipeline.scheduler());

        let thread_stats = Arc::clone(&stats);
        let thread_stopped = Arc::clone(&stopped);
        let handle = thread::Builder::new()
            .name("frame-worker".to_string())
            .spawn(move || {
                for (sequence, input) in receiver {
                    if thread_stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| pipeline.handle(sequence, input)));
                    match outcome {
                        Ok(Ok(result)) => {
                            thread_stats.processed.fetch_add(1, Ordering::Relaxed);
                            if !thread_stopped.load(Ordering::Acquire) {
                                on_result(result);
                            }
                        }
                        Ok(Err(err)) => {
                            thread_stats.failed.fetch_add(1, Ordering::Relaxed);
                            log::warn!("frame {} aborted: {}", sequence, err);
                        }
                        Err(payload) => {
                            thread_stats.failed.fetch_add(1, Ordering::Relaxed);
                            log::error!(
                                "frame {} panicked: {}",
                                sequence,
                                panic_message(payload.as_ref())
                            );
                        }
                    }
                }
                pipeline.shutdown();
                log::info!("frame worker exiting");
            })
            .context("failed to spawn frame worker")?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            stats,
            stopped,
            scheduler,
            next_sequence: 0,
        })
    }

    /// Offer a frame. Never blocks.
    pub fn submit(&mut self, frame: impl Into<FrameInput>) -> Submission {
        if self.stopped.load(Ordering::Acquire) {
            return Submission::Stopped;
        }
        let Some(sender) = self.sender.as_ref() else {
            return Submission::Stopped;
        };
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        match sender.try_send((sequence, frame.into())) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Submission::Accepted
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("worker busy, dropped frame {}", sequence);
                Submission::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Submission::Stopped,
        }
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop speech now, suppress the in-flight result and wait for the worker
    /// to release its models. Idempotent.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        self.scheduler.halt();
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("frame worker thread panicked during shutdown");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
