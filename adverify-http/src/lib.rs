//! Minimal HTTP client with safe logging and flexible auth.
//!
//! - Request options: headers, `Auth`, query params, timeout
//! - Redacts sensitive query params and never logs secret values
//! - One attempt per request; failures are reported, never retried
//! - Optional *raw* request/response logging via `ADVERIFY_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), adverify_http::HttpError> {
//! let client = adverify_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", adverify_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Security: logs only ever include the auth kind (header/query/none),
//! never the secret itself.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;

const RAW_ENV: &str = "ADVERIFY_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_LEN: usize = 500;

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_param(name: &str) -> bool {
    SECRET_PARAMS.contains(&name.to_ascii_lowercase().as_str())
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if key.eq_ignore_ascii_case("authorization")
                || key.eq_ignore_ascii_case("x-goog-api-key")
            {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

/// `host + path` and the query with secrets masked, for log lines.
fn redact_url(url: &Url) -> (String, Vec<(String, String)>) {
    let host_path = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let query = url
        .query_pairs()
        .map(|(k, v)| {
            let masked = if is_secret_param(&k) {
                "<redacted>".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), masked)
        })
        .collect();
    (host_path, query)
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

/// Authentication strategies supported by the client.
///
/// ```
/// use adverify_http::Auth;
/// use std::borrow::Cow;
///
/// let auth = Auth::Query { name: "key", value: Cow::Borrowed("secret") };
/// assert!(matches!(auth, Auth::Query { name: "key", .. }));
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Custom header (e.g. `x-goog-api-key`)
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    /// Auth via query param (e.g. Gemini's `?key=`)
    Query {
        name: &'a str,
        value: Cow<'a, str>,
    },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs.
///
/// ```
/// use adverify_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(10)),
///     ..Default::default()
/// };
/// assert_eq!(opts.timeout.unwrap().as_secs(), 10);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Option<Url>,
    inner: Client,
    pub default_timeout: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use adverify_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        // `join` drops the last path segment unless the base ends with '/'.
        let normalized = if base.ends_with('/') {
            Cow::Borrowed(base)
        } else {
            Cow::Owned(format!("{base}/"))
        };
        let base = Url::parse(&normalized).map_err(|e| HttpError::Url(e.to_string()))?;
        Self::build(Some(base))
    }

    /// A client with no base; every request path must be an absolute URL.
    pub fn unanchored() -> Result<Self, HttpError> {
        Self::build(None)
    }

    fn build(base: Option<Url>) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
        })
    }

    /// Override the default timeout.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let (body, req_id) = self.send::<()>(Method::GET, path, None, opts).await?;
        decode_json(&body, &req_id)
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (reply, req_id) = self.send(Method::POST, path, Some(body), opts).await?;
        decode_json(&reply, &req_id)
    }

    /// GET a body as text (HTML pages and the like), decoded with the
    /// `Content-Type` charset. UTF-8 when none is given.
    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<String, HttpError> {
        let (body, _) = self.send::<()>(Method::GET, path, None, opts).await?;
        Ok(body)
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        match &self.base {
            Some(base) => {
                if allow_absolute {
                    if let Ok(abs) = Url::parse(path) {
                        return Ok(abs);
                    }
                }
                base.join(path).map_err(|e| HttpError::Url(e.to_string()))
            }
            None => Url::parse(path).map_err(|e| HttpError::Url(e.to_string())),
        }
    }

    /// Sends once and returns the decoded body of a 2xx response.
    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOpts<'_>,
    ) -> Result<(String, String), HttpError>
    where
        B: Serialize + ?Sized,
    {
        let mut url = self.resolve(path, opts.allow_absolute)?;
        let query_auth = match &opts.auth {
            Some(Auth::Query { name, value }) => Some((*name, sanitize_api_key(value)?)),
            _ => None,
        };
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = &opts.query {
                for (k, v) in q {
                    pairs.append_pair(k, v);
                }
            }
            if let Some((name, key)) = &query_auth {
                pairs.append_pair(name, key);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let mut rb = self
            .inner
            .request(method.clone(), url.clone())
            .timeout(timeout);

        let mut request_body: Option<Vec<u8>> = None;
        if let Some(b) = body {
            let bytes = serde_json::to_vec(b).map_err(|e| HttpError::Build(e.to_string()))?;
            rb = rb
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes.clone());
            request_body = Some(bytes);
        }

        if let Some(hdrs) = &opts.headers {
            rb = rb.headers(hdrs.clone());
        }

        match &opts.auth {
            Some(Auth::Header { name, value }) => rb = rb.header(name, value),
            Some(Auth::Query { .. }) | Some(Auth::None) | None => {}
        }

        let req_id = format!("r{}", uuid::Uuid::new_v4().simple());
        let (host_path, redacted_q) = redact_url(&url);
        let auth_kind = opts.auth.as_ref().map_or("none", Auth::kind);

        tracing::debug!(
            req_id=%req_id,
            method=%method,
            host_path=%host_path,
            query=?redacted_q,
            timeout_ms=timeout.as_millis() as u64,
            auth_kind,
            has_body=%body.is_some(),
            "http.request.start"
        );

        if raw_enabled() {
            let headers = opts.headers.as_ref().map(redact_headers).unwrap_or_default();
            let body_text = request_body
                .as_deref()
                .map(|b| truncate_lossy(b, RAW_MAX_BODY))
                .unwrap_or_default();
            tracing::debug!(
                target: "http.raw",
                %req_id,
                %method,
                %host_path,
                query=?redacted_q,
                headers=?headers,
                body=%body_text,
                "request"
            );
        }

        let t0 = Instant::now();
        // reqwest errors print the full URL, query key included.
        let resp = rb.send().await.map_err(|err| {
            let err = err.without_url();
            tracing::warn!(req_id=%req_id, host_path=%host_path, message=%err, "http.network_error.send");
            HttpError::Network(err.to_string())
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(|err| {
            let err = err.without_url();
            tracing::warn!(req_id=%req_id, host_path=%host_path, message=%err, "http.network_error.body");
            HttpError::Network(err.to_string())
        })?;
        let bytes = text.as_bytes();
        let dur_ms = t0.elapsed().as_millis() as u64;

        let upstream_id = headers
            .get("x-request-id")
            .or_else(|| headers.get("x-goog-request-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        tracing::debug!(
            req_id=%req_id,
            %status,
            duration_ms=dur_ms,
            body_len=bytes.len(),
            x_request_id=%upstream_id,
            "http.response.headers"
        );

        if raw_enabled() {
            tracing::info!(
                target: "http.raw",
                %req_id,
                status=%status,
                duration_ms=dur_ms,
                headers=?redact_headers(&headers),
                body=%truncate_lossy(bytes, RAW_MAX_BODY),
                truncated=bytes.len() > RAW_MAX_BODY
            );
        }

        if status.is_success() {
            return Ok((text, req_id));
        }

        let message = extract_error_message(bytes);
        tracing::warn!(
            req_id=%req_id,
            %status,
            message=%message,
            x_request_id=%upstream_id,
            body_snippet=%snip_body(bytes),
            "http.error"
        );
        Err(HttpError::Api {
            status,
            message,
            request_id: upstream_id,
        })
    }
}

fn decode_json<T: DeserializeOwned>(body: &str, req_id: &str) -> Result<T, HttpError> {
    serde_json::from_str::<T>(body).map_err(|e| {
        let snippet = snip_body(body.as_bytes());
        tracing::warn!(
            req_id=%req_id,
            serde_line=%e.line(),
            serde_col=%e.column(),
            serde_err=%e,
            body_snippet=%snippet,
            "http.response.decode_error"
        );
        HttpError::Decode(e.to_string(), snippet)
    })
}

/// Best-effort provider error message from a JSON error body.
fn extract_error_message(body: &[u8]) -> String {
    // Google / OpenAI style: {"error":{"message":"...", "status":"..."}}
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(env) = serde_json::from_slice::<Envelope>(body) {
        return env.error.message;
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.message, m.detail, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn truncate_lossy(bytes: &[u8], max: usize) -> String {
    let end = bytes.len().min(max);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn snip_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > SNIPPET_LEN {
        let mut snip: String = text.chars().take(SNIPPET_LEN).collect();
        snip.push_str("...");
        snip
    } else {
        text.into_owned()
    }
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    if s.is_empty() {
        return Err(HttpError::Build("API key is empty".into()));
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn google_error_envelope_yields_its_message() {
        let body = br#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            extract_error_message(body),
            "API key not valid. Please pass a valid API key."
        );
    }

    #[test]
    fn non_json_error_bodies_fall_back_to_a_snippet() {
        let long = "x".repeat(SNIPPET_LEN + 20);
        let msg = extract_error_message(long.as_bytes());
        assert!(msg.ends_with("..."));
        assert_eq!(msg.chars().count(), SNIPPET_LEN + 3);
    }

    #[test]
    fn query_key_is_redacted_for_logs() {
        let url = Url::parse("https://host.test/v1beta/models?key=s3cr3t&pageSize=50").unwrap();
        let (host_path, query) = redact_url(&url);
        assert_eq!(host_path, "host.test/v1beta/models");
        assert_eq!(
            query,
            vec![
                ("key".to_string(), "<redacted>".to_string()),
                ("pageSize".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn pasted_keys_are_cleaned() {
        assert_eq!(sanitize_api_key(" 'abc def' \n").unwrap(), "abcdef");
        assert!(sanitize_api_key("clé").is_err());
    }

    #[test]
    fn base_without_trailing_slash_keeps_its_path() {
        let client = HttpClient::new("https://host.test/v1beta").unwrap();
        let url = client.resolve("models", false).unwrap();
        assert_eq!(url.as_str(), "https://host.test/v1beta/models");
    }

    #[test]
    fn unanchored_client_requires_absolute_urls() {
        let client = HttpClient::unanchored().unwrap();
        assert!(matches!(
            client.resolve("relative/path", true),
            Err(HttpError::Url(_))
        ));
        assert!(client.resolve("https://example.com/a", false).is_ok());
    }

    #[tokio::test]
    async fn get_text_sends_headers_and_returns_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "test-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static("test-agent"),
        );
        let client = HttpClient::unanchored().unwrap();
        let body = client
            .get_text(
                &format!("{}/page", server.uri()),
                RequestOpts {
                    headers: Some(headers),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(body, "<p>hi</p>");
    }

    #[tokio::test]
    async fn failures_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let err = client
            .get_text("flaky", RequestOpts::default())
            .await
            .unwrap_err();
        match err {
            HttpError::Api {
                status, message, ..
            } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "busy");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn header_auth_is_sent_and_redacted_in_logs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-goog-api-key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let name = HeaderName::from_static("x-goog-api-key");
        let value = HeaderValue::from_static("abc");
        let mut logged = HeaderMap::new();
        logged.insert(name.clone(), value.clone());
        assert_eq!(
            redact_headers(&logged),
            vec![("x-goog-api-key".to_string(), "<redacted>".to_string())]
        );

        let client = HttpClient::new(&server.uri()).unwrap();
        let body = client
            .get_text(
                "",
                RequestOpts {
                    auth: Some(Auth::Header { name, value }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn network_errors_never_carry_the_query_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/v1beta", listener.local_addr().unwrap());
        drop(listener);

        let client = HttpClient::new(&base).unwrap();
        let err = client
            .get_text(
                "models",
                RequestOpts {
                    auth: Some(Auth::Query {
                        name: "key",
                        value: Cow::Borrowed("SUPERSECRETKEY123"),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Network(_)), "got {err:?}");
        assert!(!err.to_string().contains("SUPERSECRETKEY123"), "leaked: {err}");
    }

    #[tokio::test]
    async fn text_bodies_follow_the_declared_charset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latin1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                b"<p>Caf\xe9 cr\xe8me</p>".to_vec(),
                "text/html; charset=iso-8859-1",
            ))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let body = client
            .get_text("latin1", RequestOpts::default())
            .await
            .unwrap();
        assert_eq!(body, "<p>Café crème</p>");
    }

    #[tokio::test]
    async fn query_auth_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let got: serde_json::Value = client
            .get_json(
                "models",
                RequestOpts {
                    auth: Some(Auth::Query {
                        name: "key",
                        value: Cow::Borrowed("abc"),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(got["ok"], true);
    }
}
