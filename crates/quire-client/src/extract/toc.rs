use quire_core::error::ScrapeError;
use quire_core::extract::{ExtractedRecord, ExtractionStrategy, FetchedPage, SelectorConfig};
use serde_json::Value;

use super::html::HtmlStrategy;
use crate::markdown::MarkdownConverter;

/// Field holding a chapter's 1-based reading position.
pub const INDEX_FIELD: &str = "index";

/// Table-of-contents pages: HTML records in reading order.
///
/// `reverse` turns newest-first listings into reading order. Records
/// without an `index` get their 1-based position in that order.
#[derive(Clone, Default)]
pub struct TocStrategy {
    html: HtmlStrategy,
}

impl TocStrategy {
    pub fn new(markdown: MarkdownConverter) -> Self {
        Self {
            html: HtmlStrategy::new(markdown),
        }
    }
}

impl ExtractionStrategy for TocStrategy {
    fn name(&self) -> &str {
        "toc"
    }

    fn extract(
        &self,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let mut records = self.html.extract(page, selectors)?;
        for (position, record) in records.iter_mut().enumerate() {
            if let Value::Object(fields) = record {
                fields
                    .entry(INDEX_FIELD)
                    .or_insert_with(|| Value::from(position + 1));
            }
        }
        Ok(records)
    }
}
