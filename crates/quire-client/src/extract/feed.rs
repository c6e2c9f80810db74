//! RSS 2.0 and Atom feeds.
//!
//! Feeds are parsed with the HTML parser, which lowercases element names:
//! select `pubdate`, not `pubDate`. CDATA sections are unwrapped into
//! escaped text first so their content survives parsing as element text.

use quire_core::error::ScrapeError;
use quire_core::extract::{ExtractedRecord, ExtractionStrategy, FetchedPage, SelectorConfig};
use scraper::Html;

use super::html::{Markup, RecordReader};
use crate::markdown::MarkdownConverter;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Replace every CDATA section with its escaped content.
pub fn unwrap_cdata(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find(CDATA_OPEN) {
        out.push_str(&rest[..start]);
        let inner = &rest[start + CDATA_OPEN.len()..];
        let (content, tail) = match inner.find(CDATA_CLOSE) {
            Some(end) => (&inner[..end], &inner[end + CDATA_CLOSE.len()..]),
            None => (inner, ""),
        };
        escape_into(&mut out, content);
        rest = tail;
    }
    out.push_str(rest);
    out
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Feed entries (`item` / `entry`) as records. A feed with no entries
/// yields no records; whether that is acceptable is the job's call.
#[derive(Clone, Default)]
pub struct FeedStrategy {
    markdown: MarkdownConverter,
}

impl FeedStrategy {
    pub fn new(markdown: MarkdownConverter) -> Self {
        Self { markdown }
    }
}

impl ExtractionStrategy for FeedStrategy {
    fn name(&self) -> &str {
        "feed"
    }

    fn extract(
        &self,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let reader = RecordReader::new(&page.url, selectors, &self.markdown, Markup::Feed)?;
        let document = Html::parse_document(&unwrap_cdata(&page.body));
        reader.read_all(&document, selectors.reverse)
    }
}
