//! CSS-selector extraction over HTML (and, in feed mode, RSS/Atom) documents.

use quire_core::error::ScrapeError;
use quire_core::extract::{
    ExtractedRecord, ExtractionStrategy, FetchedPage, FieldSelector, SelectorConfig, ValueKind,
};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use super::value::coerce;
use crate::markdown::MarkdownConverter;

pub(crate) fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::scraper(format!("invalid selector '{selector}': {e}")))
}

/// How element content is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Markup {
    Html,
    /// Feed documents parsed as HTML: element text is the payload, and
    /// `<link>` is a void element whose URL follows it as text.
    Feed,
}

struct CompiledField<'a> {
    name: &'a str,
    spec: &'a FieldSelector,
    selector: Option<Selector>,
}

/// A [`SelectorConfig`] compiled against one page.
pub(crate) struct RecordReader<'a> {
    page_url: &'a str,
    item: Selector,
    fields: Vec<CompiledField<'a>>,
    markdown: &'a MarkdownConverter,
    markup: Markup,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(
        page_url: &'a str,
        selectors: &'a SelectorConfig,
        markdown: &'a MarkdownConverter,
        markup: Markup,
    ) -> Result<Self, ScrapeError> {
        let item = compile(&selectors.item)?;
        let fields = selectors
            .fields
            .iter()
            .map(|(name, spec)| {
                let selector = spec.selector.as_deref().map(compile).transpose()?;
                Ok::<_, ScrapeError>(CompiledField {
                    name,
                    spec,
                    selector,
                })
            })
            .collect::<Result<Vec<_>, ScrapeError>>()?;

        Ok(Self {
            page_url,
            item,
            fields,
            markdown,
            markup,
        })
    }

    /// Every record in document order, or reversed.
    pub(crate) fn read_all(
        &self,
        document: &Html,
        reverse: bool,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let mut records = document
            .select(&self.item)
            .map(|item| self.read(item))
            .collect::<Result<Vec<_>, _>>()?;
        if reverse {
            records.reverse();
        }
        Ok(records)
    }

    fn read(&self, item: ElementRef<'_>) -> Result<ExtractedRecord, ScrapeError> {
        let mut record = Map::new();
        for field in &self.fields {
            let target = match &field.selector {
                Some(selector) => match item.select(selector).next() {
                    Some(element) => element,
                    None => continue,
                },
                None => item,
            };
            let Some(raw) = self.raw_value(target, field.spec) else {
                continue;
            };
            let value = coerce(&raw, field.spec.value, self.page_url, self.markdown)?;
            record.insert(field.name.to_string(), value);
        }
        Ok(Value::Object(record))
    }

    fn raw_value(&self, element: ElementRef<'_>, spec: &FieldSelector) -> Option<String> {
        if let Some(attr) = &spec.attr {
            return element.value().attr(attr).map(str::to_string);
        }
        let wants_markup = matches!(spec.value, ValueKind::Html | ValueKind::Markdown);
        if self.markup == Markup::Html && wants_markup {
            return Some(element.inner_html());
        }

        let text: String = element.text().collect();
        if self.markup == Markup::Feed && text.trim().is_empty() && element.value().name() == "link"
        {
            return feed_link(element);
        }
        Some(text)
    }
}

/// Atom `<link href>`, or the RSS link text the HTML parser moved after
/// the void `<link>` element.
fn feed_link(element: ElementRef<'_>) -> Option<String> {
    if let Some(href) = element.value().attr("href") {
        return Some(href.to_string());
    }
    element
        .next_siblings()
        .take_while(|node| !node.value().is_element())
        .find_map(|node| {
            node.value()
                .as_text()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        })
}

/// Records from HTML pages: one record per `item` match.
///
/// Registered for LIST, NEWS and SEARCH.
#[derive(Clone, Default)]
pub struct HtmlStrategy {
    markdown: MarkdownConverter,
}

impl HtmlStrategy {
    pub fn new(markdown: MarkdownConverter) -> Self {
        Self { markdown }
    }
}

impl ExtractionStrategy for HtmlStrategy {
    fn name(&self) -> &str {
        "html"
    }

    fn extract(
        &self,
        page: &FetchedPage,
        selectors: &SelectorConfig,
    ) -> Result<Vec<ExtractedRecord>, ScrapeError> {
        let reader = RecordReader::new(&page.url, selectors, &self.markdown, Markup::Html)?;
        let document = Html::parse_document(&page.body);
        reader.read_all(&document, selectors.reverse)
    }
}
