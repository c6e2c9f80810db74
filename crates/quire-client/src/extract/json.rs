use quire_core::error::ScrapeError;
use quire_core::extract::{ExtractedRecord, ExtractionStrategy, FetchedPage, SelectorConfig};
use serde_json::{Map, Value};

use super::value::coerce;
use crate::markdown::MarkdownConverter;

/// Records from JSON API bodies (user libraries, reading lists).
///
/// `item` is a JSON pointer to an array of records (or a single object);
/// an empty pointer selects the whole body. Field selectors are pointers
/// relative to each item. With no fields configured, items pass through
/// unchanged.
#[derive(Clone, Default)]
pub struct JsonStrategy {
    markdown: MarkdownConverter,
}

impl JsonStrategy {
    pub fn new(markdown: MarkdownConverter) -> Self {
        Self { markdown }
    }

    fn read(
        &self,
        page: &FetchedPage,
        item: &Value,
        selectors: &SelectorConfig,
    ) -> Result<ExtractedRecord, ScrapeError> {
        if selectors.fields.is_empty() {
            return Ok(item.clone());
        }

        let mut record = Map::new();
        for (name, field) in &selectors.fields {
            let pointer = field.selector.as_deref().unwrap_or("");
            let Some(found) = item.pointer(pointer) else {
                continue;
            };
            let value = match found {
                Value::String(raw) => coerce(raw, field.value, &page.url, &self.markdown)?,
                Value::Null => continue,
                other => other.clone(),
            };
            record.insert(name.clone(), value);
        }
        Ok(Value::Object(record))
    }
}

impl ExtractionStrategy for JsonStrategy {
    fn name(&self) -> &str {
        "json"
    }

    fn extract(
        &self,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let body: Value = serde_json::from_str(&page.body)
            .map_err(|e| ScrapeError::scraper(format!("invalid JSON body: {e}")))?;

        let root = body.pointer(&selectors.item).ok_or_else(|| {
            ScrapeError::scraper(format!("JSON pointer '{}' not found", selectors.item))
        })?;

        let items: Vec<&Value> = match root {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![root],
            other => {
                return Err(ScrapeError::scraper(format!(
                    "JSON pointer '{}' selects a scalar: {other}",
                    selectors.item
                )));
            }
        };

        let mut records = items
            .into_iter()
            .map(|item| self.read(page, item, selectors))
            .collect::<Result<Vec<_>, _>>()?;
        if selectors.reverse {
            records.reverse();
        }
        Ok(records)
    }
}
