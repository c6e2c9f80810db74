use std::sync::Arc;

use htmd::HtmlToMarkdown;
use quire_core::error::ScrapeError;

/// HTML-to-Markdown conversion for `markdown` fields, using htmd.
///
/// Page chrome (scripts, styles, navigation) is dropped so chapter
/// bodies and news posts come out as plain prose.
#[derive(Clone)]
pub struct MarkdownConverter {
    converter: Arc<HtmlToMarkdown>,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "aside", "noscript", "iframe", "svg", "form",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    pub fn convert(&self, html: &str) -> Result<String, ScrapeError> {
        self.converter
            .convert(html)
            .map(|md| md.trim().to_string())
            .map_err(|e| ScrapeError::scraper(format!("markdown conversion failed: {e}")))
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}
