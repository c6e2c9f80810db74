use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::executor::JobExecutor;
use crate::job::ScrapeJob;
use crate::job_queue::JobQueue;
use crate::models::JobResult;
use crate::traits::{Fetcher, ResultSink};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Upper bound on jobs running at once.
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            max_concurrent_jobs: 4,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }
}

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    JobReceived {
        job: &'a ScrapeJob,
    },
    JobCompleted {
        job_id: Uuid,
        accepted: usize,
        errors: usize,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        retryable: bool,
    },
    JobCancelled {
        job_id: Uuid,
    },
    SinkFailed {
        job_id: Uuid,
        error: &'a str,
    },
    ShuttingDown {
        worker_id: &'a str,
        in_flight: usize,
    },
    Stopped {
        worker_id: &'a str,
        processed: u64,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::JobReceived { job } => {
                tracing::info!(
                    job_id = %job.id,
                    scrape_type = %job.scrape_type,
                    targets = job.targets.len(),
                    "Job received"
                );
            }
            WorkerEvent::JobCompleted {
                job_id,
                accepted,
                errors,
            } => {
                tracing::info!(%job_id, %accepted, %errors, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                retryable,
            } => {
                tracing::warn!(%job_id, %error, %retryable, "Job failed");
            }
            WorkerEvent::JobCancelled { job_id } => {
                tracing::info!(%job_id, "Job cancelled");
            }
            WorkerEvent::SinkFailed { job_id, error } => {
                tracing::error!(%job_id, %error, "Failed to emit job result");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                in_flight,
            } => {
                tracing::info!(%worker_id, %in_flight, "Worker shutting down");
            }
            WorkerEvent::Stopped {
                worker_id,
                processed,
            } => {
                tracing::info!(%worker_id, %processed, "Worker stopped");
            }
        }
    }
}

/// What a job task hands back to the worker loop.
enum JobOutcome {
    Finished {
        result: JobResult,
        sink_error: Option<AppError>,
    },
    Cancelled {
        job_id: Uuid,
    },
}

/// Pulls jobs from a queue, runs them concurrently on the executor and
/// emits every finished result to the sink.
pub struct WorkerService<Q, F, S>
where
    Q: JobQueue,
    F: Fetcher + 'static,
    S: ResultSink + 'static,
{
    queue: Q,
    executor: Arc<JobExecutor<F>>,
    sink: S,
    config: WorkerConfig,
}

impl<Q, F, S> WorkerService<Q, F, S>
where
    Q: JobQueue,
    F: Fetcher + 'static,
    S: ResultSink + 'static,
{
    pub fn new(queue: Q, executor: Arc<JobExecutor<F>>, sink: S, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            sink,
            config,
        }
    }

    /// Run until the queue is closed and drained, or until cancellation.
    ///
    /// On cancellation, in-flight jobs are cancelled at their next
    /// suspension point and no result is emitted for them. Returns the
    /// number of jobs that reached a terminal state.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<u64, AppError> {
        let worker_id = self.config.worker_id.as_str();
        let max_jobs = self.config.max_concurrent_jobs.max(1);
        reporter.report(WorkerEvent::Started { worker_id });

        let mut in_flight: JoinSet<JobOutcome> = JoinSet::new();
        let mut processed = 0u64;
        let mut queue_open = true;

        loop {
            if !queue_open && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = cancel_token.cancelled() => break,

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if Self::settle(joined, reporter) {
                        processed += 1;
                    }
                }

                job = self.queue.next_job(), if queue_open && in_flight.len() < max_jobs => {
                    match job {
                        Some(job) => {
                            reporter.report(WorkerEvent::JobReceived { job: &job });
                            in_flight.spawn(run_job(
                                Arc::clone(&self.executor),
                                self.sink.clone(),
                                job,
                                cancel_token.child_token(),
                            ));
                        }
                        None => {
                            tracing::debug!("Job queue closed, draining in-flight jobs");
                            queue_open = false;
                        }
                    }
                }
            }
        }

        if cancel_token.is_cancelled() {
            reporter.report(WorkerEvent::ShuttingDown {
                worker_id,
                in_flight: in_flight.len(),
            });
            while let Some(joined) = in_flight.join_next().await {
                if Self::settle(joined, reporter) {
                    processed += 1;
                }
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id,
            processed,
        });
        Ok(processed)
    }

    /// Report a finished task. Returns true if the job reached a terminal state.
    fn settle<WR: WorkerReporter>(joined: Result<JobOutcome, JoinError>, reporter: &WR) -> bool {
        match joined {
            Ok(JobOutcome::Finished { result, sink_error }) => {
                match result.failure() {
                    None => reporter.report(WorkerEvent::JobCompleted {
                        job_id: result.job_id,
                        accepted: result.accepted.len(),
                        errors: result.errors.len(),
                    }),
                    Some(error) => {
                        let message = error.to_string();
                        reporter.report(WorkerEvent::JobFailed {
                            job_id: result.job_id,
                            error: &message,
                            retryable: error.is_retryable(),
                        });
                    }
                }
                if let Some(e) = sink_error {
                    let message = e.to_string();
                    reporter.report(WorkerEvent::SinkFailed {
                        job_id: result.job_id,
                        error: &message,
                    });
                }
                true
            }
            Ok(JobOutcome::Cancelled { job_id }) => {
                reporter.report(WorkerEvent::JobCancelled { job_id });
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Job task aborted");
                false
            }
        }
    }
}

async fn run_job<F, S>(
    executor: Arc<JobExecutor<F>>,
    sink: S,
    job: ScrapeJob,
    cancel: CancellationToken,
) -> JobOutcome
where
    F: Fetcher + 'static,
    S: ResultSink,
{
    let job_id = job.id;
    let result = tokio::select! {
        result = executor.submit(job) => result,
        () = cancel.cancelled() => return JobOutcome::Cancelled { job_id },
    };
    let sink_error = sink.emit(&result).await.err();
    JobOutcome::Finished { result, sink_error }
}
