pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod extract;
pub mod job;
pub mod job_queue;
pub mod models;
pub mod rate_limit;
pub mod schema;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use config::{EngineConfig, EngineSettings, TypeConfig, TypeProfile};
pub use error::{AppError, ScrapeError, UrlFailure};
pub use executor::JobExecutor;
pub use extract::{
    ExtractedRecord, ExtractionStrategy, ExtractorRegistry, FetchedPage, FieldSelector,
    SelectorConfig, ValueKind,
};
pub use job::{JobConfig, JobState, ScrapeJob, ScrapeType};
pub use models::{JobResult, TargetReport, compute_hash};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use schema::{RecordSchema, ValidationResult, Violation};
pub use traits::{Fetcher, NullSink, ResultSink};
pub use worker::{TracingWorkerReporter, WorkerConfig, WorkerEvent, WorkerReporter, WorkerService};
