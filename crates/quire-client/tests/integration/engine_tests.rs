use std::time::Duration;

use quire_core::error::{ScrapeError, UrlFailure};
use quire_core::job::{JobState, ScrapeJob, ScrapeType};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::{TOC_PAGE, executor, serve};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn toc_page_yields_every_chapter() {
    let server = MockServer::start().await;
    serve(&server, "/novel/toc", 200, TOC_PAGE).await;
    let url = format!("{}/novel/toc", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Toc, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.accepted.len(), 3);
    assert!(result.errors.is_empty());
    assert_eq!(
        result.accepted[0],
        json!({
            "title": "Chapter 1: Spark",
            "url": format!("{}/novel/c/1", server.uri()),
            "index": 1
        })
    );
    assert_eq!(result.accepted[2]["index"], json!(3));
    assert!(result.targets[0].content_hash.is_some());
}

#[tokio::test]
async fn not_found_is_a_missing_resource() {
    let server = MockServer::start().await;
    serve(&server, "/novel/toc", 404, "gone").await;
    let url = format!("{}/novel/toc", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Toc, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.errors.len(), 1);
    match result.failure() {
        Some(ScrapeError::MissingResource { resource, .. }) => assert_eq!(resource, &url),
        other => panic!("expected missing resource, got {other:?}"),
    }
    assert!(!result.is_retryable());
}

#[tokio::test]
async fn invalid_row_is_reported_alongside_valid_one() {
    let server = MockServer::start().await;
    let page = r#"<ul class="chapters">
        <li><a href="/novel/c/1">Chapter 1</a></li>
        <li><a>Chapter 2 (locked)</a></li>
    </ul>"#;
    serve(&server, "/novel/toc", 200, page).await;
    let url = format!("{}/novel/toc", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Toc, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.accepted.len(), 1);
    assert_eq!(result.errors.len(), 1);
    match &result.errors[0] {
        ScrapeError::Validation { record, violations } => {
            assert_eq!(*record, 1);
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].path, "url");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn feed_without_new_items_completes_empty() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/novel/feed.xml",
        200,
        concat!(
            r#"<?xml version="1.0"?><rss version="2.0">"#,
            r#"<channel><title>The Long Road</title></channel></rss>"#,
        ),
    )
    .await;
    let url = format!("{}/novel/feed.xml", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Feed, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Completed);
    assert!(result.accepted.is_empty());
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn feed_items_are_extracted() {
    let server = MockServer::start().await;
    let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item>
    <title><![CDATA[Chapter 4: Ash]]></title>
    <link>/novel/c/4</link>
    <pubDate>Tue, 05 Mar 2024 10:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;
    serve(&server, "/novel/feed.xml", 200, feed).await;
    let url = format!("{}/novel/feed.xml", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Feed, [url.as_str()]))
        .await;

    assert_eq!(
        result.accepted,
        vec![json!({
            "title": "Chapter 4: Ash",
            "url": format!("{}/novel/c/4", server.uri()),
            "published_at": "2024-03-05T10:00:00Z"
        })]
    );
}

#[tokio::test]
async fn user_library_from_json_api() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/api/users/42",
        200,
        concat!(
            r#"{"library": [{"title": "The Long Road", "path": "/novel/1"}, "#,
            r#"{"title": "Ashes", "path": "/novel/2"}]}"#,
        ),
    )
    .await;
    let url = format!("{}/api/users/42", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::OnetimeUser, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.accepted.len(), 2);
    assert_eq!(
        result.accepted[1]["url"],
        json!(format!("{}/novel/2", server.uri()))
    );
}

#[tokio::test]
async fn server_error_is_retryable() {
    let server = MockServer::start().await;
    serve(&server, "/search", 503, "maintenance").await;
    let url = format!("{}/search", server.uri());

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Search, [url.as_str()]))
        .await;

    assert_eq!(result.state, JobState::Failed);
    assert!(matches!(
        result.failure(),
        Some(ScrapeError::Url {
            failure: UrlFailure::Status { code: 503 },
            ..
        })
    ));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/novel/toc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TOC_PAGE)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let url = format!("{}/novel/toc", server.uri());

    let result = executor(Duration::from_millis(200))
        .submit(ScrapeJob::new(ScrapeType::Toc, [url.as_str()]))
        .await;

    match result.failure() {
        Some(ScrapeError::Url { failure, url: failed, .. }) => {
            assert_eq!(*failure, UrlFailure::Timeout);
            assert_eq!(failed, &url);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(result.is_retryable());
}

#[tokio::test]
async fn refused_connection_is_retryable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{addr}/novel/toc");

    let result = executor(TIMEOUT)
        .submit(ScrapeJob::new(ScrapeType::Toc, [url.as_str()]))
        .await;

    assert!(matches!(
        result.failure(),
        Some(ScrapeError::Url {
            failure: UrlFailure::Connection,
            ..
        })
    ));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn independent_targets_survive_one_missing_page() {
    let server = MockServer::start().await;
    serve(&server, "/a/toc", 200, TOC_PAGE).await;
    serve(&server, "/b/toc", 404, "").await;
    let targets = [
        format!("{}/a/toc", server.uri()),
        format!("{}/b/toc", server.uri()),
    ];

    let job = ScrapeJob::new(ScrapeType::OnetimeToc, targets.iter().map(String::as_str))
        .independent_targets();
    let result = executor(TIMEOUT).submit(job).await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.accepted.len(), 3);
    assert_eq!(result.errors.len(), 1);
    assert!(result.targets[1].is_failed());
}
