use std::future::Future;

use crate::error::{AppError, ScrapeError};
use crate::models::JobResult;

/// Fetches the raw body of a target URL.
///
/// Implementations classify their own failures: transport problems become
/// [`ScrapeError::Url`], a confirmed absence becomes
/// [`ScrapeError::MissingResource`].
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, ScrapeError>> + Send;
}

/// Receives every finished job result, exactly once per job.
pub trait ResultSink: Send + Sync + Clone {
    fn emit(&self, result: &JobResult) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A sink that drops every result. Useful when only the returned
/// `JobResult` matters.
#[derive(Debug, Clone)]
pub struct NullSink;

impl ResultSink for NullSink {
    async fn emit(&self, _result: &JobResult) -> Result<(), AppError> {
        Ok(())
    }
}
