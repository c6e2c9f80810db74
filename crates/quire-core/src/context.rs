//! Job-scoped execution context.
//!
//! Every job runs inside [`scope`], which installs a fresh key/value map as
//! a tokio task-local for the lifetime of the job future. Any code polled as
//! part of that future (including code running after an `.await`) sees the
//! same map through [`get`] and [`set`]; other jobs, even on the same worker
//! thread, see their own. The map is dropped with the future, whether it
//! completes, fails, or is cancelled.
//!
//! Spawned tasks do not inherit the context.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::ScrapeJob;

/// Id of the running job.
pub const JOB_ID: &str = "job_id";
/// Scrape type of the running job.
pub const SCRAPE_TYPE: &str = "scrape_type";
/// Target URL currently being processed.
pub const TARGET: &str = "target";
/// Current executor state of the job.
pub const STATE: &str = "state";

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// Flat key/value map owned by one job.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    values: RefCell<HashMap<String, Value>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-seeded with the job's id and scrape type.
    pub fn for_job(job: &ScrapeJob) -> Self {
        let context = Self::new();
        {
            let mut values = context.values.borrow_mut();
            values.insert(JOB_ID.to_string(), Value::String(job.id.to_string()));
            values.insert(
                SCRAPE_TYPE.to_string(),
                Value::String(job.scrape_type.as_str().to_string()),
            );
        }
        context
    }
}

/// Run `body` with `context` installed as the current job context.
pub async fn scope<F>(context: ExecutionContext, body: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(context, body).await
}

/// True when called from inside a job.
pub fn is_active() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Read a value from the current job's context.
///
/// Returns `None` both for unset keys and when no job is running.
pub fn get(key: &str) -> Option<Value> {
    CURRENT
        .try_with(|ctx| ctx.values.borrow().get(key).cloned())
        .ok()
        .flatten()
}

/// Write a value into the current job's context.
pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Result<(), AppError> {
    CURRENT
        .try_with(|ctx| {
            ctx.values.borrow_mut().insert(key.into(), value.into());
        })
        .map_err(|_| AppError::NoContext)
}

/// Remove a key from the current job's context, returning its old value.
pub fn remove(key: &str) -> Option<Value> {
    CURRENT
        .try_with(|ctx| ctx.values.borrow_mut().remove(key))
        .ok()
        .flatten()
}

/// Id of the running job, if any.
pub fn job_id() -> Option<Uuid> {
    get(JOB_ID)
        .and_then(|v| v.as_str().map(str::to_owned))
        .and_then(|s| Uuid::parse_str(&s).ok())
}
