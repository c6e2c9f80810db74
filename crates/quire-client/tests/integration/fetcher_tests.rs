use quire_client::ReqwestFetcher;
use quire_core::error::{ScrapeError, UrlFailure};
use quire_core::traits::Fetcher;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::serve;

#[tokio::test]
async fn returns_body_and_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/toc"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ul></ul>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = ReqwestFetcher::new()
        .unwrap()
        .fetch(&format!("{}/toc", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "<ul></ul>");
}

#[tokio::test]
async fn gone_is_a_missing_resource() {
    let server = MockServer::start().await;
    serve(&server, "/novel/9", 410, "").await;
    let url = format!("{}/novel/9", server.uri());

    let err = ReqwestFetcher::new().unwrap().fetch(&url).await.unwrap_err();
    assert_eq!(err.kind(), "missing_resource_error");
    assert!(matches!(err, ScrapeError::MissingResource { resource, .. } if resource == url));
}

#[tokio::test]
async fn forbidden_is_a_permanent_url_error() {
    let server = MockServer::start().await;
    serve(&server, "/toc", 403, "").await;

    let err = ReqwestFetcher::new()
        .unwrap()
        .fetch(&format!("{}/toc", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Url {
            failure: UrlFailure::Status { code: 403 },
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn too_many_requests_is_retryable() {
    let server = MockServer::start().await;
    serve(&server, "/toc", 429, "").await;

    let err = ReqwestFetcher::new()
        .unwrap()
        .fetch(&format!("{}/toc", server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old-toc"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/toc"))
        .mount(&server)
        .await;
    serve(&server, "/toc", 200, "moved here").await;

    let body = ReqwestFetcher::new()
        .unwrap()
        .fetch(&format!("{}/old-toc", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "moved here");
}

#[tokio::test]
async fn non_http_scheme_is_invalid() {
    let err = ReqwestFetcher::new()
        .unwrap()
        .fetch("ftp://example.com/toc")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Url {
            failure: UrlFailure::Invalid,
            ..
        }
    ));
}
