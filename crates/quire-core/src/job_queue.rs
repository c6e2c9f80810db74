use std::future::Future;

use tokio::sync::{Mutex, mpsc};

use crate::error::AppError;
use crate::job::ScrapeJob;

/// Source of jobs for a worker.
///
/// `next_job` resolves to `None` once the queue is closed and drained; the
/// worker then finishes its in-flight jobs and stops.
pub trait JobQueue: Send + Sync {
    fn next_job(&self) -> impl Future<Output = Option<ScrapeJob>> + Send;
}

/// Bounded in-memory queue. Returns the submitting half and the queue.
pub fn channel(capacity: usize) -> (JobSender, ChannelQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobSender { tx },
        ChannelQueue {
            rx: Mutex::new(rx),
        },
    )
}

/// Cloneable handle for submitting jobs to a [`ChannelQueue`].
///
/// The queue closes when every sender has been dropped.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<ScrapeJob>,
}

impl JobSender {
    /// Enqueue a job, waiting for capacity if the queue is full.
    pub async fn send(&self, job: ScrapeJob) -> Result<(), AppError> {
        self.tx.send(job).await.map_err(|_| AppError::QueueClosed)
    }
}

#[derive(Debug)]
pub struct ChannelQueue {
    rx: Mutex<mpsc::Receiver<ScrapeJob>>,
}

impl JobQueue for ChannelQueue {
    async fn next_job(&self) -> Option<ScrapeJob> {
        self.rx.lock().await.recv().await
    }
}
