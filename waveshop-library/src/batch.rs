//! Sequential batch job queue
//!
//! Jobs run strictly in enqueue order, one at a time. A failing job is marked
//! and the queue moves on. Changes are reported to an optional observer
//! callback and to any number of channel subscribers.

use std::fmt::Display;
use std::sync::Arc;

use crossbeam_channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Batch job identifier
pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// One unit of work and its outcome
#[derive(Debug, Clone)]
pub struct BatchJob<I, R> {
    pub id: JobId,
    pub input: Arc<I>,
    pub status: JobStatus,
    /// Percent complete, 0 - 100
    pub progress: f32,
    pub result: Option<R>,
    pub error: Option<String>,
}

/// Progress updates streamed to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Queued { id: JobId },
    Started { id: JobId },
    Progress { id: JobId, progress: f32 },
    Completed { id: JobId },
    Failed { id: JobId, message: String },
    /// `process_all` returned
    Finished { completed: usize, failed: usize },
}

/// Outcome counts of one `process_all` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
}

type Observer<I, R> = Box<dyn FnMut(&BatchJob<I, R>) + Send>;

pub struct BatchQueue<I, R> {
    jobs: Vec<BatchJob<I, R>>,
    observer: Option<Observer<I, R>>,
    subscribers: Vec<Sender<BatchEvent>>,
}

impl<I, R> Default for BatchQueue<I, R> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            observer: None,
            subscribers: Vec::new(),
        }
    }
}

fn notify<I, R>(observer: &mut Option<Observer<I, R>>, job: &BatchJob<I, R>) {
    if let Some(observer) = observer.as_mut() {
        observer(job);
    }
}

/// Send to every live subscriber, dropping disconnected ones
fn broadcast(subscribers: &mut Vec<Sender<BatchEvent>>, event: BatchEvent) {
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
}

impl<I, R> BatchQueue<I, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending job
    pub fn enqueue(&mut self, input: I) -> JobId {
        let job = BatchJob {
            id: Uuid::new_v4(),
            input: Arc::new(input),
            status: JobStatus::Pending,
            progress: 0.0,
            result: None,
            error: None,
        };
        let id = job.id;
        notify(&mut self.observer, &job);
        broadcast(&mut self.subscribers, BatchEvent::Queued { id });
        self.jobs.push(job);
        id
    }

    pub fn jobs(&self) -> &[BatchJob<I, R>] {
        &self.jobs
    }

    pub fn get(&self, id: JobId) -> Option<&BatchJob<I, R>> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove a job; unknown ids and processing jobs are left alone
    pub fn remove(&mut self, id: JobId) {
        self.jobs
            .retain(|job| job.id != id || job.status == JobStatus::Processing);
    }

    /// Remove every job that is not processing
    pub fn clear(&mut self) {
        self.jobs.retain(|job| job.status == JobStatus::Processing);
    }

    /// Remove completed and failed jobs
    pub fn clear_finished(&mut self) {
        self.jobs.retain(|job| !job.status.is_finished());
    }

    /// Called after every status or progress change
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&BatchJob<I, R>) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Stream of [`BatchEvent`]s from now on
    pub fn subscribe(&mut self) -> Receiver<BatchEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Run every pending job in order
    ///
    /// `work` receives the job input and a progress reporter taking percent
    /// values (clamped to 0 - 100). An `Err` marks only that job as failed.
    #[instrument(skip_all, fields(jobs = self.jobs.len()))]
    pub fn process_all<F, E>(&mut self, mut work: F) -> BatchSummary
    where
        F: FnMut(&I, &mut dyn FnMut(f32)) -> Result<R, E>,
        E: Display,
    {
        let mut summary = BatchSummary::default();

        for index in 0..self.jobs.len() {
            if self.jobs[index].status != JobStatus::Pending {
                continue;
            }

            let (id, input) = {
                let job = &mut self.jobs[index];
                job.status = JobStatus::Processing;
                job.progress = 0.0;
                (job.id, Arc::clone(&job.input))
            };
            debug!(%id, "job started");
            notify(&mut self.observer, &self.jobs[index]);
            broadcast(&mut self.subscribers, BatchEvent::Started { id });

            let outcome = {
                let jobs = &mut self.jobs;
                let observer = &mut self.observer;
                let subscribers = &mut self.subscribers;
                let mut report = |progress: f32| {
                    if progress.is_nan() {
                        return;
                    }
                    let job = &mut jobs[index];
                    job.progress = progress.clamp(0.0, 100.0);
                    notify(&mut *observer, job);
                    broadcast(
                        &mut *subscribers,
                        BatchEvent::Progress {
                            id,
                            progress: job.progress,
                        },
                    );
                };
                work(&*input, &mut report)
            };

            let job = &mut self.jobs[index];
            match outcome {
                Ok(result) => {
                    job.status = JobStatus::Complete;
                    job.progress = 100.0;
                    job.result = Some(result);
                    summary.completed += 1;
                    debug!(%id, "job complete");
                    notify(&mut self.observer, job);
                    broadcast(&mut self.subscribers, BatchEvent::Completed { id });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(%id, error = %message, "job failed");
                    job.status = JobStatus::Error;
                    job.error = Some(message.clone());
                    summary.failed += 1;
                    notify(&mut self.observer, job);
                    broadcast(&mut self.subscribers, BatchEvent::Failed { id, message });
                }
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            "batch finished"
        );
        broadcast(
            &mut self.subscribers,
            BatchEvent::Finished {
                completed: summary.completed,
                failed: summary.failed,
            },
        );
        summary
    }
}
