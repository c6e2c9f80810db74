use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::SelectorConfig;
use crate::job::ScrapeType;
use crate::rate_limit::RateLimitConfig;
use crate::schema::{RecordSchema, SchemaResolver};

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from("schemas")
}

/// Raw engine configuration, as read from JSON.
///
/// ```json
/// {
///   "rate_limiter": { "window_ms": 1000, "limit": 2 },
///   "fetch_timeout_ms": 30000,
///   "schemas_dir": "schemas",
///   "types": {
///     "toc": { "schema": "toc@latest", "selectors": { "item": "li.chapter" } },
///     "feed": { "schema": "feed@1.0.0", "selectors": { "item": "item" }, "allow_empty": true }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rate_limiter: RateLimitConfig,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,
    /// Per scrape type profile, keyed by type name.
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
}

/// Defaults for every job of one scrape type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConfig {
    /// Schema reference (`name@version`, `name@latest` or a file path).
    pub schema: String,
    pub selectors: SelectorConfig,
    /// Whether a job may complete with zero accepted records.
    #[serde(default)]
    pub allow_empty: bool,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!("Invalid config {}: {e}", path.display()))
        })
    }

    /// Apply `QUIRE_*` environment overrides.
    ///
    /// - `QUIRE_RATE_LIMIT`: max fetch starts per window
    /// - `QUIRE_RATE_WINDOW_MS`: window length in milliseconds
    /// - `QUIRE_FETCH_TIMEOUT_MS`: per-fetch deadline in milliseconds
    /// - `QUIRE_SCHEMAS_DIR`: schemas directory
    pub fn apply_env(self) -> Result<Self, AppError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<L>(mut self, lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("QUIRE_RATE_LIMIT") {
            self.rate_limiter.limit = parse_positive("QUIRE_RATE_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("QUIRE_RATE_WINDOW_MS") {
            self.rate_limiter.window_ms = parse_positive("QUIRE_RATE_WINDOW_MS", &raw)?;
        }
        if let Some(raw) = lookup("QUIRE_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_positive("QUIRE_FETCH_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("QUIRE_SCHEMAS_DIR") {
            self.schemas_dir = PathBuf::from(raw);
        }
        Ok(self)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validate the configuration and load every referenced schema.
    ///
    /// Fails if any scrape type has no profile, if a type name is unknown,
    /// or if any limit/timeout is zero.
    pub fn resolve(&self) -> Result<EngineSettings, AppError> {
        self.rate_limiter.validate()?;
        if self.fetch_timeout_ms == 0 {
            return Err(AppError::ConfigError(
                "fetch_timeout_ms must be greater than 0".into(),
            ));
        }

        let resolver = SchemaResolver::new(&self.schemas_dir);
        let mut profiles = HashMap::new();
        for (type_name, type_config) in &self.types {
            let scrape_type: ScrapeType = type_name.parse().map_err(AppError::ConfigError)?;
            let resolved = resolver.resolve(&type_config.schema)?;
            tracing::debug!(%scrape_type, schema = %resolved.name, "Loaded schema");
            profiles.insert(
                scrape_type,
                TypeProfile {
                    schema_name: resolved.name,
                    schema: Arc::new(resolved.schema),
                    selectors: type_config.selectors.clone(),
                    allow_empty: type_config.allow_empty,
                },
            );
        }

        EngineSettings::new(self.rate_limiter, self.fetch_timeout(), profiles)
    }
}

fn parse_positive<T>(name: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == T::default() {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}

/// Resolved defaults for one scrape type.
#[derive(Debug, Clone)]
pub struct TypeProfile {
    pub schema_name: String,
    pub schema: Arc<RecordSchema>,
    pub selectors: SelectorConfig,
    pub allow_empty: bool,
}

/// Validated, fully loaded engine settings. Every scrape type has a profile.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub rate_limit: RateLimitConfig,
    pub fetch_timeout: Duration,
    profiles: HashMap<ScrapeType, TypeProfile>,
    /// Every loaded schema by name, for per-job overrides.
    schemas: HashMap<String, Arc<RecordSchema>>,
}

impl EngineSettings {
    pub fn new(
        rate_limit: RateLimitConfig,
        fetch_timeout: Duration,
        profiles: HashMap<ScrapeType, TypeProfile>,
    ) -> Result<Self, AppError> {
        rate_limit.validate()?;
        if fetch_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "fetch timeout must be greater than 0".into(),
            ));
        }

        let missing: Vec<_> = ScrapeType::ALL
            .into_iter()
            .filter(|t| !profiles.contains_key(t))
            .map(|t| t.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ConfigError(format!(
                "No profile configured for scrape types: {}",
                missing.join(", ")
            )));
        }

        let schemas = profiles
            .values()
            .map(|p| (p.schema_name.clone(), Arc::clone(&p.schema)))
            .collect();

        Ok(Self {
            rate_limit,
            fetch_timeout,
            profiles,
            schemas,
        })
    }

    /// Make an extra schema available to jobs that name it explicitly.
    pub fn with_schema(mut self, name: impl Into<String>, schema: RecordSchema) -> Self {
        self.schemas.insert(name.into(), Arc::new(schema));
        self
    }

    pub fn profile(&self, scrape_type: ScrapeType) -> Option<&TypeProfile> {
        self.profiles.get(&scrape_type)
    }

    pub fn schema(&self, name: &str) -> Option<Arc<RecordSchema>> {
        self.schemas.get(name).cloned()
    }
}
