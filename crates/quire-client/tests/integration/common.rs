use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quire_client::{ReqwestFetcher, default_registry};
use quire_core::config::{EngineSettings, TypeProfile};
use quire_core::executor::JobExecutor;
use quire_core::extract::{FieldSelector, SelectorConfig, ValueKind};
use quire_core::job::ScrapeType;
use quire_core::rate_limit::RateLimitConfig;
use quire_core::schema::{FieldFormat, FieldRule, FieldType, RecordSchema};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOC_PAGE: &str = r#"<html><body>
  <h1>The Long Road</h1>
  <ul class="chapters">
    <li><a href="/novel/c/1">Chapter 1: Spark</a></li>
    <li><a href="/novel/c/2">Chapter 2: Smoke</a></li>
    <li><a href="/novel/c/3">Chapter 3: Ember</a></li>
  </ul>
</body></html>"#;

/// Every record needs a non-empty title and an absolute http(s) URL.
pub fn chapter_schema() -> RecordSchema {
    RecordSchema::new()
        .field(
            "title",
            FieldRule::new(FieldType::String)
                .required()
                .with_format(FieldFormat::NonEmpty),
        )
        .field(
            "url",
            FieldRule::new(FieldType::String)
                .required()
                .with_format(FieldFormat::Url),
        )
        .field("index", FieldRule::new(FieldType::Integer))
        .field(
            "published_at",
            FieldRule::new(FieldType::String).with_format(FieldFormat::DateTime),
        )
}

fn selectors_for(scrape_type: ScrapeType) -> SelectorConfig {
    match scrape_type {
        ScrapeType::Toc | ScrapeType::OnetimeToc => SelectorConfig::new("ul.chapters > li")
            .field("title", FieldSelector::text("a"))
            .field("url", FieldSelector::attr("a", "href").as_kind(ValueKind::Url)),
        ScrapeType::Feed => SelectorConfig::new("item")
            .field("title", FieldSelector::text("title"))
            .field("url", FieldSelector::text("link").as_kind(ValueKind::Url))
            .field(
                "published_at",
                FieldSelector::text("pubdate").as_kind(ValueKind::Datetime),
            ),
        ScrapeType::OnetimeUser => SelectorConfig::new("/library")
            .field("title", FieldSelector::text("/title"))
            .field("url", FieldSelector::text("/path").as_kind(ValueKind::Url)),
        ScrapeType::List | ScrapeType::News | ScrapeType::Search => {
            SelectorConfig::new("div.result")
                .field("title", FieldSelector::text("a"))
                .field("url", FieldSelector::attr("a", "href").as_kind(ValueKind::Url))
        }
    }
}

pub fn settings(fetch_timeout: Duration) -> EngineSettings {
    let schema = Arc::new(chapter_schema());
    let profiles: HashMap<_, _> = ScrapeType::ALL
        .into_iter()
        .map(|scrape_type| {
            let profile = TypeProfile {
                schema_name: "chapter@1.0.0".to_string(),
                schema: Arc::clone(&schema),
                selectors: selectors_for(scrape_type),
                allow_empty: scrape_type == ScrapeType::Feed,
            };
            (scrape_type, profile)
        })
        .collect();

    EngineSettings::new(
        RateLimitConfig::new(Duration::from_secs(1), 50),
        fetch_timeout,
        profiles,
    )
    .unwrap()
}

pub fn executor(fetch_timeout: Duration) -> JobExecutor<ReqwestFetcher> {
    let fetcher = ReqwestFetcher::with_timeout(fetch_timeout).unwrap();
    JobExecutor::new(fetcher, default_registry().unwrap(), settings(fetch_timeout)).unwrap()
}

/// Serve `body` at `route` with the given status.
pub async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}
