use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::SelectorConfig;

/// Kind of content a job scrapes. Selects the extraction strategy and the
/// default schema/selectors from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeType {
    List,
    Feed,
    News,
    Toc,
    OnetimeUser,
    OnetimeToc,
    Search,
}

impl ScrapeType {
    /// Every scrape type, in declaration order.
    pub const ALL: [ScrapeType; 7] = [
        ScrapeType::List,
        ScrapeType::Feed,
        ScrapeType::News,
        ScrapeType::Toc,
        ScrapeType::OnetimeUser,
        ScrapeType::OnetimeToc,
        ScrapeType::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeType::List => "list",
            ScrapeType::Feed => "feed",
            ScrapeType::News => "news",
            ScrapeType::Toc => "toc",
            ScrapeType::OnetimeUser => "onetime_user",
            ScrapeType::OnetimeToc => "onetime_toc",
            ScrapeType::Search => "search",
        }
    }

    /// Dense index into [`ScrapeType::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ScrapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScrapeType {
    type Err = String;

    /// Accepts `onetime_toc`, `onetime-toc` and `ONETIME_TOC` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ScrapeType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown scrape type: {}", s))
    }
}

/// Lifecycle of one job inside the executor.
///
/// ```text
/// Pending -> Throttled -> Fetching -> Extracting -> Validating -> Completed
///                 ^                                      |
///                 +------------ next target -------------+
/// any state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Throttled,
    Fetching,
    Extracting,
    Validating,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Throttled => "throttled",
            JobState::Fetching => "fetching",
            JobState::Extracting => "extracting",
            JobState::Validating => "validating",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-job extraction settings. Anything left unset falls back to the
/// profile configured for the job's [`ScrapeType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Selector override for this job only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SelectorConfig>,

    /// Name of a loaded schema to validate against instead of the type default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Whether zero accepted records still counts as success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_empty: Option<bool>,

    /// Report failures per target instead of failing the whole job on the
    /// first fetch/extraction error.
    #[serde(default)]
    pub independent_targets: bool,
}

/// A unit of scrape work handed to the executor by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub scrape_type: ScrapeType,
    pub targets: Vec<String>,
    #[serde(default)]
    pub config: JobConfig,
}

impl ScrapeJob {
    pub fn new<I, S>(scrape_type: ScrapeType, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            scrape_type,
            targets: targets.into_iter().map(Into::into).collect(),
            config: JobConfig::default(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_selectors(mut self, selectors: SelectorConfig) -> Self {
        self.config.selectors = Some(selectors);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schema = Some(schema.into());
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.config.allow_empty = Some(allow);
        self
    }

    pub fn independent_targets(mut self) -> Self {
        self.config.independent_targets = true;
        self
    }
}
