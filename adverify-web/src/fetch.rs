use std::time::Duration;

use adverify_common::{
    AdverifyError, BROWSER_USER_AGENT, DEFAULT_SCRAPE_TIMEOUT_SECS, Result,
};
use adverify_http::{HttpClient, HttpError, RequestOpts};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::extract::visible_text;

/// Anything that can turn a URL into the page's visible text.
///
/// The pipeline depends on this seam so it can be driven without a network.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<String>;
}

/// Fetches a page once with a browser-like identity and extracts its text.
pub struct Extractor {
    http: HttpClient,
    user_agent: String,
    timeout: Duration,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        let http = HttpClient::unanchored().map_err(|e| AdverifyError::Config(e.to_string()))?;
        Ok(Self {
            http,
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_SCRAPE_TIMEOUT_SECS),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let value = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| AdverifyError::Config(format!("user agent: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, value);
        Ok(headers)
    }
}

#[async_trait]
impl PageScraper for Extractor {
    async fn scrape(&self, url: &str) -> Result<String> {
        let target = parse_target(url)?;
        let opts = RequestOpts {
            timeout: Some(self.timeout),
            headers: Some(self.headers()?),
            ..Default::default()
        };

        tracing::info!(host = target.host_str().unwrap_or("-"), "scrape.start");
        let html = self
            .http
            .get_text(target.as_str(), opts)
            .await
            .map_err(|err| classify(err, url))?;

        let text = visible_text(&html);
        tracing::info!(
            html_bytes = html.len(),
            text_chars = text.chars().count(),
            "scrape.done"
        );
        if text.is_empty() {
            tracing::warn!("scrape.empty_text");
        }
        Ok(text)
    }
}

/// Accepts absolute http(s) URLs only.
pub fn parse_target(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| AdverifyError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(AdverifyError::InvalidUrl(format!(
            "{url}: unsupported scheme '{other}'"
        ))),
    }
}

fn classify(err: HttpError, url: &str) -> AdverifyError {
    match err {
        HttpError::Api { status, .. } => AdverifyError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        },
        HttpError::Network(msg) => AdverifyError::Network(msg),
        HttpError::Url(msg) => AdverifyError::InvalidUrl(msg),
        HttpError::Build(msg) | HttpError::Decode(msg, _) => AdverifyError::Config(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn only_http_schemes_are_targets() {
        assert!(parse_target("https://example.com/about").is_ok());
        assert!(parse_target("  http://example.com  ").is_ok());
        assert!(matches!(
            parse_target("ftp://example.com/file"),
            Err(AdverifyError::InvalidUrl(m)) if m.contains("ftp")
        ));
        assert!(matches!(
            parse_target("example.com"),
            Err(AdverifyError::InvalidUrl(_))
        ));
    }

    #[test]
    fn status_errors_keep_code_and_url() {
        let err = classify(
            HttpError::Api {
                status: StatusCode::NOT_FOUND,
                message: "Not Found".into(),
                request_id: "-".into(),
            },
            "https://example.com/missing",
        );
        match err {
            AdverifyError::HttpStatus { status, url } => {
                assert_eq!(status, 404);
                assert_eq!(url, "https://example.com/missing");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transport_errors_are_network_failures() {
        let err = classify(HttpError::Network("connection refused".into()), "http://x");
        assert_eq!(err.category(), "network_failure");
    }
}
