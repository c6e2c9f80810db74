//! Per-job orchestration: throttle, fetch, extract, validate, classify.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::context::{self, ExecutionContext};
use crate::error::{AppError, ScrapeError, UrlFailure};
use crate::extract::{ExtractedRecord, ExtractorRegistry, FetchedPage, SelectorConfig};
use crate::job::{JobState, ScrapeJob, ScrapeType};
use crate::models::{JobResult, TargetReport, compute_hash};
use crate::rate_limit::RateLimiter;
use crate::schema::RecordSchema;
use crate::traits::Fetcher;

/// Runs scrape jobs end to end.
///
/// Generic over the fetcher so tests can run the full state machine without
/// network access. The rate limiter is the only state shared between jobs;
/// everything else a job touches lives in its own future.
pub struct JobExecutor<F>
where
    F: Fetcher,
{
    fetcher: F,
    limiter: Arc<RateLimiter>,
    registry: ExtractorRegistry,
    settings: EngineSettings,
}

impl<F> JobExecutor<F>
where
    F: Fetcher,
{
    pub fn new(
        fetcher: F,
        registry: ExtractorRegistry,
        settings: EngineSettings,
    ) -> Result<Self, AppError> {
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit)?);
        Ok(Self {
            fetcher,
            limiter,
            registry,
            settings,
        })
    }

    /// Share a rate limiter with other executors instead of owning one.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one job to a terminal state.
    ///
    /// Never returns an `Err`: every failure is classified into the returned
    /// [`JobResult`]. Dropping the future cancels the job at its current
    /// suspension point and tears down its context.
    pub async fn submit(&self, job: ScrapeJob) -> JobResult {
        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            scrape_type = %job.scrape_type
        );
        let context = ExecutionContext::for_job(&job);
        context::scope(context, self.execute(job))
            .instrument(span)
            .await
    }

    /// Run a job on its own task.
    pub fn spawn(self: &Arc<Self>, job: ScrapeJob) -> JoinHandle<JobResult>
    where
        F: 'static,
    {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.submit(job).await })
    }

    async fn execute(&self, job: ScrapeJob) -> JobResult {
        let mut run = JobRun::new(&job);
        tracing::info!(targets = job.targets.len(), "Job started");

        let plan = match self.plan(&job) {
            Ok(plan) => plan,
            Err(e) => return run.fail(e),
        };
        if job.targets.is_empty() {
            return run.fail(ScrapeError::scraper("job has no targets"));
        }

        for url in &job.targets {
            record(context::TARGET, url);
            let report = self.process_target(&mut run, &plan, url).await;

            if let Some(error) = &report.error {
                if !plan.independent_targets {
                    let error = error.clone();
                    run.targets.push(report);
                    return run.fail(error);
                }
                tracing::warn!(
                    target_url = %url,
                    kind = error.kind(),
                    %error,
                    "Target failed, continuing with remaining targets"
                );
            }
            run.targets.push(report);
        }

        run.finish(plan.allow_empty)
    }

    /// Merge the job's overrides with its type profile.
    fn plan<'a>(&'a self, job: &'a ScrapeJob) -> Result<JobPlan<'a>, ScrapeError> {
        let profile = self.settings.profile(job.scrape_type).ok_or_else(|| {
            ScrapeError::scraper(format!("no profile configured for {}", job.scrape_type))
        })?;

        let (schema_name, schema) = match job.config.schema.as_deref() {
            Some(name) => {
                let schema = self
                    .settings
                    .schema(name)
                    .ok_or_else(|| ScrapeError::scraper(format!("unknown schema '{name}'")))?;
                (name, schema)
            }
            None => (profile.schema_name.as_str(), Arc::clone(&profile.schema)),
        };

        Ok(JobPlan {
            scrape_type: job.scrape_type,
            selectors: job.config.selectors.as_ref().unwrap_or(&profile.selectors),
            schema_name,
            schema,
            allow_empty: job.config.allow_empty.unwrap_or(profile.allow_empty),
            independent_targets: job.config.independent_targets,
        })
    }

    async fn process_target(
        &self,
        run: &mut JobRun,
        plan: &JobPlan<'_>,
        url: &str,
    ) -> TargetReport {
        let mut report = TargetReport::new(url);
        if let Err(e) = check_target(url) {
            report.error = Some(e);
            return report;
        }

        run.transition(JobState::Throttled);
        let permit = self.limiter.acquire().await;
        tracing::debug!(target_url = %url, granted_at = ?permit.granted_at(), "Fetch permitted");

        run.transition(JobState::Fetching);
        let fetch = tokio::time::timeout(self.settings.fetch_timeout, self.fetcher.fetch(url));
        let body = match fetch.await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                report.error = Some(e);
                return report;
            }
            Err(_) => {
                report.error = Some(ScrapeError::url(
                    url,
                    UrlFailure::Timeout,
                    format!(
                        "fetch exceeded {}ms deadline",
                        self.settings.fetch_timeout.as_millis()
                    ),
                ));
                return report;
            }
        };
        report.content_hash = Some(compute_hash(&body));
        tracing::info!(target_url = %url, bytes = body.len(), "Fetched target");

        run.transition(JobState::Extracting);
        let page = FetchedPage::new(url, body);
        let records = match self.registry.extract(plan.scrape_type, &page, plan.selectors) {
            Ok(records) => records,
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        };
        report.records = records.len();

        run.transition(JobState::Validating);
        for (position, record) in records.into_iter().enumerate() {
            let outcome = plan.schema.validate(&record);
            if outcome.valid {
                report.accepted += 1;
                run.accepted.push(record);
            } else {
                tracing::debug!(
                    target_url = %url,
                    record = position,
                    schema = plan.schema_name,
                    violations = outcome.violations.len(),
                    "Record rejected"
                );
                run.rejected.push(ScrapeError::Validation {
                    record: position,
                    violations: outcome.violations,
                });
            }
        }

        tracing::info!(
            target_url = %url,
            extracted = report.records,
            accepted = report.accepted,
            "Target processed"
        );
        report
    }
}

/// Reject targets that are not absolute http(s) URLs before spending a permit.
fn check_target(target: &str) -> Result<(), ScrapeError> {
    let parsed = Url::parse(target)
        .map_err(|e| ScrapeError::url(target, UrlFailure::Invalid, format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ScrapeError::url(
            target,
            UrlFailure::Invalid,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

struct JobPlan<'a> {
    scrape_type: ScrapeType,
    selectors: &'a SelectorConfig,
    schema_name: &'a str,
    schema: Arc<RecordSchema>,
    allow_empty: bool,
    independent_targets: bool,
}

/// Write job progress into the context. Only called under `context::scope`.
fn record(key: &str, value: &str) {
    let written = context::set(key, value);
    debug_assert!(written.is_ok(), "job progress recorded outside a job context");
}

/// Mutable bookkeeping for one job while it runs.
struct JobRun {
    job_id: Uuid,
    scrape_type: ScrapeType,
    state: JobState,
    started_at: DateTime<Utc>,
    accepted: Vec<ExtractedRecord>,
    rejected: Vec<ScrapeError>,
    targets: Vec<TargetReport>,
}

impl JobRun {
    fn new(job: &ScrapeJob) -> Self {
        record(context::STATE, JobState::Pending.as_str());
        Self {
            job_id: job.id,
            scrape_type: job.scrape_type,
            state: JobState::Pending,
            started_at: Utc::now(),
            accepted: Vec::new(),
            rejected: Vec::new(),
            targets: Vec::with_capacity(job.targets.len()),
        }
    }

    fn transition(&mut self, next: JobState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "State transition");
        }
        self.state = next;
        record(context::STATE, next.as_str());
    }

    /// Decide the terminal state once every target has been processed.
    ///
    /// A job with nothing accepted fails with a retryable target error when
    /// there is one, so the scheduler can retry it; otherwise with the first
    /// rejected record, then the first target error.
    fn finish(mut self, allow_empty: bool) -> JobResult {
        let target_errors: Vec<ScrapeError> =
            self.targets.iter().filter_map(|t| t.error.clone()).collect();

        if target_errors.len() == self.targets.len()
            && let Some(first) = target_errors.first()
        {
            return self.fail(first.clone());
        }

        if self.accepted.is_empty() && !allow_empty {
            let error = target_errors
                .iter()
                .find(|e| e.is_retryable())
                .or(self.rejected.first())
                .or(target_errors.first())
                .cloned()
                .unwrap_or_else(|| ScrapeError::scraper("no records extracted"));
            return self.fail(error);
        }

        self.transition(JobState::Completed);
        let mut errors = target_errors;
        errors.append(&mut self.rejected);
        tracing::info!(
            accepted = self.accepted.len(),
            errors = errors.len(),
            "Job completed"
        );
        JobResult {
            job_id: self.job_id,
            scrape_type: self.scrape_type,
            state: JobState::Completed,
            accepted: self.accepted,
            errors,
            targets: self.targets,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Terminal failure: exactly one error, nothing accepted.
    fn fail(mut self, error: ScrapeError) -> JobResult {
        let failed_in = self.state;
        self.transition(JobState::Failed);
        tracing::warn!(
            kind = error.kind(),
            retryable = error.is_retryable(),
            %failed_in,
            %error,
            "Job failed"
        );
        JobResult {
            job_id: self.job_id,
            scrape_type: self.scrape_type,
            state: JobState::Failed,
            accepted: Vec::new(),
            errors: vec![error],
            targets: self.targets,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
