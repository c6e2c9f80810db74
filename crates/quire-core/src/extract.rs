//! Extraction strategies and the registry that dispatches to them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ScrapeError};
use crate::job::ScrapeType;

/// A structured record produced by a strategy. Its shape is defined by the
/// schema it is validated against, not by the engine.
pub type ExtractedRecord = serde_json::Value;

/// A successfully fetched target.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub body: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

/// How a raw field value is turned into JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Whitespace-normalized text.
    #[default]
    Text,
    /// Inner HTML, untouched.
    Html,
    /// Inner HTML converted to Markdown.
    Markdown,
    /// URL resolved against the page URL.
    Url,
    /// First integer found in the text ("Chapter 12" → 12).
    Integer,
    /// First decimal number found in the text.
    Number,
    /// Timestamp normalized to RFC 3339.
    Datetime,
}

/// Where to find one field of a record, relative to the record's item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector (HTML, feeds) or JSON pointer (JSON bodies) relative to
    /// the item. `None` reads the item itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Attribute to read instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    #[serde(default)]
    pub value: ValueKind,
}

impl FieldSelector {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn attr(selector: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            attr: Some(attr.into()),
            value: ValueKind::Text,
        }
    }

    pub fn as_kind(mut self, value: ValueKind) -> Self {
        self.value = value;
        self
    }
}

/// Selector definitions for one scrape type or job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Selects each record's root: a CSS selector, or a JSON pointer to an
    /// array for JSON bodies.
    pub item: String,
    /// Output field name → where to read it.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSelector>,
    /// Emit records in reverse document order (newest-first pages).
    #[serde(default)]
    pub reverse: bool,
}

impl SelectorConfig {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            fields: BTreeMap::new(),
            reverse: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>, selector: FieldSelector) -> Self {
        self.fields.insert(name.into(), selector);
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Turns a fetched body into candidate records for one scrape type.
///
/// Implementations must not touch shared mutable state. Returning zero
/// records is a valid outcome; structural problems (unparseable body,
/// invalid selector) are reported as [`ScrapeError::Scraper`].
pub trait ExtractionStrategy: Send + Sync {
    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;

    fn extract(
        &self,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError>;
}

/// Complete mapping from every [`ScrapeType`] to its strategy.
///
/// Only obtainable through [`RegistryBuilder::build`], which refuses to
/// build unless every type is covered.
#[derive(Clone)]
pub struct ExtractorRegistry {
    /// Indexed by `ScrapeType::index`.
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl ExtractorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn strategy(&self, scrape_type: ScrapeType) -> &dyn ExtractionStrategy {
        self.strategies[scrape_type.index()].as_ref()
    }

    pub fn extract(
        &self,
        scrape_type: ScrapeType,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let strategy = self.strategy(scrape_type);
        tracing::debug!(
            strategy = strategy.name(),
            %scrape_type,
            bytes = page.body.len(),
            "Extracting records"
        );
        strategy.extract(page, selectors)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for scrape_type in ScrapeType::ALL {
            map.entry(&scrape_type.as_str(), &self.strategy(scrape_type).name());
        }
        map.finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    strategies: HashMap<ScrapeType, Arc<dyn ExtractionStrategy>>,
}

impl RegistryBuilder {
    /// Register `strategy` for one type, replacing any earlier registration.
    pub fn register<S>(mut self, scrape_type: ScrapeType, strategy: S) -> Self
    where
        S: ExtractionStrategy + 'static,
    {
        self.strategies.insert(scrape_type, Arc::new(strategy));
        self
    }

    /// Register one shared strategy instance for several types.
    pub fn register_shared(
        mut self,
        scrape_types: &[ScrapeType],
        strategy: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        for scrape_type in scrape_types {
            self.strategies.insert(*scrape_type, Arc::clone(&strategy));
        }
        self
    }

    pub fn build(mut self) -> Result<ExtractorRegistry, AppError> {
        let mut strategies = Vec::with_capacity(ScrapeType::ALL.len());
        let mut missing = Vec::new();
        for scrape_type in ScrapeType::ALL {
            match self.strategies.remove(&scrape_type) {
                Some(strategy) => strategies.push(strategy),
                None => missing.push(scrape_type),
            }
        }
        if !missing.is_empty() {
            return Err(AppError::MissingStrategy(missing));
        }
        Ok(ExtractorRegistry { strategies })
    }
}
