use std::net::IpAddr;
use std::time::Duration;

use quire_core::error::{AppError, ScrapeError, UrlFailure};
use quire_core::traits::Fetcher;
use reqwest::{Client, StatusCode, redirect};
use url::Url;

const USER_AGENT: &str = concat!("Quire/", env!("CARGO_PKG_VERSION"), " (serial fiction tracker)");
const MAX_REDIRECTS: usize = 5;

/// HTTP fetcher using reqwest.
///
/// Classifies failures for the executor: transport problems become
/// [`ScrapeError::Url`], `404 Not Found` and `410 Gone` become
/// [`ScrapeError::MissingResource`]. Never retries.
///
/// Requests to private/reserved addresses are allowed by default; call
/// [`block_private_addresses`](Self::block_private_addresses) when targets
/// come from untrusted input.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
    block_private: bool,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            block_private: false,
        })
    }

    /// Refuse targets that resolve to loopback, private or link-local IPs.
    pub fn block_private_addresses(mut self) -> Self {
        self.block_private = true;
        self
    }

    fn classify(&self, url: &str, e: &reqwest::Error) -> ScrapeError {
        if e.is_timeout() {
            ScrapeError::url(
                url,
                UrlFailure::Timeout,
                format!("no response within {}ms", self.timeout.as_millis()),
            )
        } else if e.is_connect() {
            ScrapeError::url(url, UrlFailure::Connection, format!("connection failed: {e}"))
        } else {
            ScrapeError::url(url, UrlFailure::Request, e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let parsed = parse_target(url)?;
        if self.block_private {
            check_public_host(url, &parsed).await?;
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(url, &e))?;

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "Received response");
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(ScrapeError::missing(url, format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ScrapeError::url(
                url,
                UrlFailure::Status {
                    code: status.as_u16(),
                },
                format!("HTTP {status}"),
            ));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(url, &e)
            } else {
                ScrapeError::url(
                    url,
                    UrlFailure::Body,
                    format!("failed to read response body: {e}"),
                )
            }
        })
    }
}

fn parse_target(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url)
        .map_err(|e| ScrapeError::url(url, UrlFailure::Invalid, format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ScrapeError::url(
            url,
            UrlFailure::Invalid,
            format!("URL scheme '{scheme}' is not allowed (only http/https)"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Private address blocking
// ---------------------------------------------------------------------------

async fn check_public_host(url: &str, parsed: &Url) -> Result<(), ScrapeError> {
    let host = parsed
        .host_str()
        .ok_or_else(|| ScrapeError::url(url, UrlFailure::Invalid, "URL has no host"))?;

    let addresses: Vec<IpAddr> = match host.trim_matches(['[', ']']).parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => {
            let port = parsed.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((host, port))
                .await
                .map_err(|e| {
                    ScrapeError::url(
                        url,
                        UrlFailure::Connection,
                        format!("DNS resolution failed for {host}: {e}"),
                    )
                })?
                .map(|addr| addr.ip())
                .collect()
        }
    };

    match addresses.into_iter().find(|ip| is_private_ip(*ip)) {
        Some(ip) => Err(ScrapeError::url(
            url,
            UrlFailure::Invalid,
            format!("{host} resolves to private address {ip}"),
        )),
        None => Ok(()),
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFFC0) == 0xFE80
                || (first & 0xFE00) == 0xFC00
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ranges() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "192.168.0.10",
            "169.254.169.254",
            "100.64.0.1",
            "::1",
            "fe80::1",
            "fd00::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_private_ip(ip.parse().unwrap()), "{ip} should be private");
        }
        for ip in ["93.184.216.34", "2001:4860:4860::8888"] {
            assert!(!is_private_ip(ip.parse().unwrap()), "{ip} should be public");
        }
    }

    #[test]
    fn test_parse_target_rejects_non_http() {
        let err = parse_target("file:///etc/passwd").unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Url {
                failure: UrlFailure::Invalid,
                ..
            }
        ));
        assert!(parse_target("example.com/toc").is_err());
        assert!(parse_target("https://example.com/toc").is_ok());
    }

    #[tokio::test]
    async fn test_blocked_private_target_is_not_fetched() {
        let fetcher = ReqwestFetcher::new().unwrap().block_private_addresses();
        let err = fetcher.fetch("http://127.0.0.1:9/toc").await.unwrap_err();
        assert!(err.to_string().contains("private address"));
        assert!(!err.is_retryable());
    }
}
