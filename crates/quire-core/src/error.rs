use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::ScrapeType;
use crate::schema::Violation;

/// Engine-level errors: configuration, startup and plumbing failures.
///
/// These never describe the outcome of a single job; per-job failures are
/// classified as [`ScrapeError`] and travel inside a `JobResult`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or incomplete engine configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A schema reference could not be resolved or parsed.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// The extractor registry was built without a strategy for some types.
    #[error("No extraction strategy registered for: {}", join_types(.0))]
    MissingStrategy(Vec<ScrapeType>),

    /// The result sink rejected a job result.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// The job queue was closed while submitting.
    #[error("Job queue closed")]
    QueueClosed,

    /// Execution context accessed outside of a running job.
    #[error("No execution context: not running inside a job")]
    NoContext,

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_types(types: &[ScrapeType]) -> String {
    types
        .iter()
        .map(ScrapeType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What went wrong at the transport level for a [`ScrapeError::Url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlFailure {
    /// The target is not a fetchable http(s) URL.
    Invalid,
    /// The per-fetch deadline elapsed.
    Timeout,
    /// DNS failure, refused or reset connection.
    Connection,
    /// Any other request-level failure (TLS, redirects, protocol).
    Request,
    /// The server answered with a non-success status other than "not found".
    Status { code: u16 },
    /// The response body could not be read.
    Body,
}

impl UrlFailure {
    pub fn is_transient(&self) -> bool {
        match self {
            UrlFailure::Timeout | UrlFailure::Connection | UrlFailure::Body => true,
            UrlFailure::Status { code } => *code == 429 || *code >= 500,
            UrlFailure::Invalid | UrlFailure::Request => false,
        }
    }
}

/// Classified failure of a scrape job (or of one of its targets/records).
///
/// Closed set: every failure the engine reports is one of these four kinds.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeError {
    /// Transport-level failure fetching `url`.
    #[serde(rename = "url_error")]
    #[error("URL error for {url}: {message}")]
    Url {
        message: String,
        url: String,
        failure: UrlFailure,
    },

    /// The remote confirmed that `resource` does not exist.
    #[serde(rename = "missing_resource_error")]
    #[error("Missing resource {resource}: {message}")]
    MissingResource { message: String, resource: String },

    /// An extracted record did not match its schema. `record` is the
    /// record's position within the target it was extracted from.
    #[serde(rename = "validation_error")]
    #[error("Record {record} failed validation: {}", summarize(violations))]
    Validation {
        record: usize,
        violations: Vec<Violation>,
    },

    /// Internal or extraction failure (malformed body, bad selector, ...).
    #[serde(rename = "scraper_error")]
    #[error("Scraper error: {cause}")]
    Scraper { cause: String },
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ScrapeError {
    pub fn url(url: impl Into<String>, failure: UrlFailure, message: impl Into<String>) -> Self {
        ScrapeError::Url {
            message: message.into(),
            url: url.into(),
            failure,
        }
    }

    pub fn missing(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ScrapeError::MissingResource {
            message: message.into(),
            resource: resource.into(),
        }
    }

    pub fn scraper(cause: impl Into<String>) -> Self {
        ScrapeError::Scraper {
            cause: cause.into(),
        }
    }

    /// Short, stable name of the error kind for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Url { .. } => "url_error",
            ScrapeError::MissingResource { .. } => "missing_resource_error",
            ScrapeError::Validation { .. } => "validation_error",
            ScrapeError::Scraper { .. } => "scraper_error",
        }
    }

    /// Returns true if the scheduler may retry the job later.
    ///
    /// Only transient transport failures qualify; missing resources,
    /// validation failures and extraction faults are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Url { failure, .. } => failure.is_transient(),
            _ => false,
        }
    }
}
