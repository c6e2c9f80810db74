//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::{EngineSettings, TypeProfile};
use crate::context;
use crate::error::{AppError, ScrapeError};
use crate::extract::{
    ExtractedRecord, ExtractionStrategy, ExtractorRegistry, FetchedPage, SelectorConfig,
};
use crate::job::{ScrapeJob, ScrapeType};
use crate::models::JobResult;
use crate::rate_limit::RateLimitConfig;
use crate::schema::{FieldFormat, FieldRule, FieldType, RecordSchema};
use crate::traits::{Fetcher, ResultSink};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type FetchResponse = Result<String, ScrapeError>;

/// Mock fetcher with a default response and optional per-URL routes.
/// Records every call with the (tokio) instant it started.
#[derive(Clone)]
pub struct MockFetcher {
    default: FetchResponse,
    routes: Arc<Mutex<HashMap<String, FetchResponse>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_response(Ok(body.to_string()))
    }

    pub fn with_error(error: ScrapeError) -> Self {
        Self::with_response(Err(error))
    }

    fn with_response(default: FetchResponse) -> Self {
        Self {
            default,
            routes: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Respond to `url` with `response` instead of the default.
    pub fn route(self, url: &str, response: FetchResponse) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), response);
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let routed = self.routes.lock().unwrap().get(url).cloned();
        routed.unwrap_or_else(|| self.default.clone())
    }
}

// ---------------------------------------------------------------------------
// MockStrategy
// ---------------------------------------------------------------------------

/// Strategy that returns a fixed set of records (or a fixed error) and
/// records what the execution context holds on every call.
#[derive(Clone)]
pub struct MockStrategy {
    name: String,
    output: Result<Vec<ExtractedRecord>, ScrapeError>,
    seen_jobs: Arc<Mutex<Vec<Option<Value>>>>,
    seen_steps: Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>>,
}

impl MockStrategy {
    pub fn new(records: Vec<ExtractedRecord>) -> Self {
        Self::named("mock", records)
    }

    pub fn named(name: &str, records: Vec<ExtractedRecord>) -> Self {
        Self {
            name: name.to_string(),
            output: Ok(records),
            seen_jobs: Arc::new(Mutex::new(Vec::new())),
            seen_steps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: ScrapeError) -> Self {
        Self {
            name: "failing".to_string(),
            output: Err(error),
            seen_jobs: Arc::new(Mutex::new(Vec::new())),
            seen_steps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Job id from the execution context, one entry per call.
    pub fn seen_jobs(&self) -> Vec<Option<Value>> {
        self.seen_jobs.lock().unwrap().clone()
    }

    /// `(target, state)` from the execution context, one entry per call.
    pub fn seen_steps(&self) -> Vec<(Option<Value>, Option<Value>)> {
        self.seen_steps.lock().unwrap().clone()
    }
}

impl ExtractionStrategy for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(
        &self,
        _page: &FetchedPage,
        _selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        self.seen_jobs
            .lock()
            .unwrap()
            .push(context::get(context::JOB_ID));
        self.seen_steps
            .lock()
            .unwrap()
            .push((context::get(context::TARGET), context::get(context::STATE)));
        self.output.clone()
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Sink that stores every emitted result; optionally fails every emit.
#[derive(Clone, Default)]
pub struct MockSink {
    pub results: Arc<Mutex<Vec<JobResult>>>,
    fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn results(&self) -> Vec<JobResult> {
        self.results.lock().unwrap().clone()
    }
}

impl ResultSink for MockSink {
    async fn emit(&self, result: &JobResult) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::SinkError("sink unavailable".into()));
        }
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps the debug rendering of every event.
#[derive(Default)]
pub struct MockReporter {
    pub events: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn make_test_job(scrape_type: ScrapeType, targets: &[&str]) -> ScrapeJob {
    ScrapeJob::new(scrape_type, targets.iter().copied())
}

/// Records need a non-empty string `title`.
pub fn test_schema() -> RecordSchema {
    RecordSchema::new()
        .field(
            "title",
            FieldRule::new(FieldType::String)
                .required()
                .with_format(FieldFormat::NonEmpty),
        )
        .field("url", FieldRule::new(FieldType::String))
}

/// Settings with a profile for every type and a permissive rate limit.
pub fn test_settings(allow_empty: bool) -> EngineSettings {
    let schema = Arc::new(test_schema());
    let profiles = ScrapeType::ALL
        .into_iter()
        .map(|t| {
            let profile = TypeProfile {
                schema_name: "chapter@1.0.0".to_string(),
                schema: Arc::clone(&schema),
                selectors: SelectorConfig::new("li"),
                allow_empty,
            };
            (t, profile)
        })
        .collect();
    EngineSettings::new(
        RateLimitConfig::new(Duration::from_secs(1), 1000),
        Duration::from_secs(30),
        profiles,
    )
    .unwrap()
}

/// Registry with `strategy` registered for every type.
pub fn test_registry(strategy: MockStrategy) -> ExtractorRegistry {
    ExtractorRegistry::builder()
        .register_shared(&ScrapeType::ALL, Arc::new(strategy))
        .build()
        .unwrap()
}
