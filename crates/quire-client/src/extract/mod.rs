//! Concrete extraction strategies, one per scrape type.

mod feed;
mod html;
mod json;
mod toc;
pub mod value;

use std::sync::Arc;

use quire_core::error::AppError;
use quire_core::extract::{ExtractionStrategy, ExtractorRegistry};
use quire_core::job::ScrapeType;

use crate::markdown::MarkdownConverter;

pub use feed::{FeedStrategy, unwrap_cdata};
pub use html::HtmlStrategy;
pub use json::JsonStrategy;
pub use toc::{INDEX_FIELD, TocStrategy};

/// Registry with the stock strategy for every scrape type.
pub fn default_registry() -> Result<ExtractorRegistry, AppError> {
    let markdown = MarkdownConverter::new();
    let html: Arc<dyn ExtractionStrategy> = Arc::new(HtmlStrategy::new(markdown.clone()));
    let toc: Arc<dyn ExtractionStrategy> = Arc::new(TocStrategy::new(markdown.clone()));

    ExtractorRegistry::builder()
        .register_shared(
            &[ScrapeType::List, ScrapeType::News, ScrapeType::Search],
            html,
        )
        .register_shared(&[ScrapeType::Toc, ScrapeType::OnetimeToc], toc)
        .register(ScrapeType::Feed, FeedStrategy::new(markdown.clone()))
        .register(ScrapeType::OnetimeUser, JsonStrategy::new(markdown))
        .build()
}
