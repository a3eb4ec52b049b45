use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::TextRecognizer;
use crate::frame::RgbFrame;

struct Job {
    id: u64,
    crop: RgbFrame,
}

struct Answer {
    id: u64,
    text: Result<Option<String>>,
}

/// Runs a recognizer on its own thread and waits at most `timeout` per crop.
///
/// A crop that times out yields no text. While that job is still running,
/// further crops also yield no text; the late answer is discarded when it
/// arrives.
pub struct TimedRecognizer {
    name: &'static str,
    jobs: Option<SyncSender<Job>>,
    answers: Receiver<Answer>,
    timeout: Duration,
    next_id: u64,
    outstanding: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl TimedRecognizer {
    pub fn spawn<R: TextRecognizer + 'static>(mut inner: R, timeout: Duration) -> Result<Self> {
        let name = inner.name();
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
        let (answer_tx, answer_rx) = mpsc::channel::<Answer>();

        let handle = thread::Builder::new()
            .name("ocr".to_string())
            .spawn(move || {
                for job in job_rx {
                    // A panicking engine fails this crop only; the thread stays up.
                    let text = panic::catch_unwind(AssertUnwindSafe(|| inner.recognize(&job.crop)))
                        .unwrap_or_else(|_| {
                            log::error!("recognizer '{}' panicked on job {}", name, job.id);
                            Err(anyhow!("recognizer panicked"))
                        });
                    if answer_tx.send(Answer { id: job.id, text }).is_err() {
                        break;
                    }
                }
                log::debug!("ocr thread exiting");
            })
            .context("failed to spawn OCR thread")?;

        Ok(Self {
            name,
            jobs: Some(job_tx),
            answers: answer_rx,
            timeout,
            next_id: 0,
            outstanding: None,
            handle: Some(handle),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop answers to jobs that already timed out.
    fn drain_late_answers(&mut self) -> Result<()> {
        loop {
            match self.answers.try_recv() {
                Ok(answer) => {
                    if self.outstanding == Some(answer.id) {
                        self.outstanding = None;
                    }
                    log::debug!("discarding late OCR answer for job {}", answer.id);
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(anyhow!("OCR thread has exited"));
                }
            }
        }
    }
}

impl TextRecognizer for TimedRecognizer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn recognize(&mut self, crop: &RgbFrame) -> Result<Option<String>> {
        self.drain_late_answers()?;
        if let Some(id) = self.outstanding {
            log::debug!("OCR still busy with job {}, skipping crop", id);
            return Ok(None);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("OCR thread has been shut down"))?;
        match jobs.try_send(Job {
            id,
            crop: crop.clone(),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Ok(None),
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("OCR thread has exited")),
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.answers.recv_timeout(remaining) {
                Ok(answer) if answer.id == id => return answer.text,
                Ok(answer) => {
                    log::debug!("discarding late OCR answer for job {}", answer.id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "OCR timed out after {} ms; treating text as absent",
                        self.timeout.as_millis()
                    );
                    self.outstanding = Some(id);
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("OCR thread has exited"));
                }
            }
        }
    }
}

impl Drop for TimedRecognizer {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            // A recognizer stuck past its timeout would block the join.
            if self.outstanding.is_none() {
                let _ = handle.join();
            }
        }
    }
}
