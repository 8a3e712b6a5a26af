//! Common types shared across the adverify crates.
//!
//! This crate defines the provider configuration handed to the LLM layer,
//! observability helpers, and the error taxonomy every step of a verification
//! request reports through. It stays dependency-light so the HTTP, web, and
//! LLM crates can all sit on top of it.
//!
//! # Overview
//!
//! - [`LlmConfig`]: which generative-model provider to talk to and how
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`AdverifyError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use adverify_common::{AdverifyError, LlmConfig};
//!
//! let cfg = LlmConfig::gemini("secret", None);
//! assert_eq!(cfg.configured_model(), None);
//!
//! let err = AdverifyError::InputMissing("target URL");
//! assert_eq!(err.category(), "input_missing");
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Default endpoint of the Gemini REST API.
pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client identity sent when scraping; some sites refuse non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Scrape timeout in seconds.
pub const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 10;

/// Source text beyond this many characters is not sent to the model.
pub const DEFAULT_MAX_SOURCE_CHARS: usize = 30_000;

/// Configuration for the generative-model provider.
///
/// `model: None` means "ask the provider's catalog"; see `adverify-llm` for
/// the selection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmConfig {
    Gemini {
        api_key: String,
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    None,
}

impl LlmConfig {
    /// Gemini against the public endpoint.
    pub fn gemini(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self::Gemini {
            api_key: api_key.into(),
            model,
            base_url: None,
        }
    }

    pub fn configured_model(&self) -> Option<&str> {
        match self {
            Self::Gemini { model, .. } => model.as_deref().filter(|m| !m.trim().is_empty()),
            Self::None => None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::None
    }
}

/// Every way a verification request can fail.
///
/// Variants are grouped by the step that produces them: input validation,
/// scraping, and verification.
#[derive(thiserror::Error, Debug)]
pub enum AdverifyError {
    /// A required input (credential, URL, or ad script) was blank.
    #[error("missing input: {0}")]
    InputMissing(&'static str),

    /// The target URL could not be parsed or is not http(s).
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport failure talking to the target site or the provider.
    #[error("network failure: {0}")]
    Network(String),

    /// The target site answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The provider refused the API key.
    #[error("credential rejected by provider: {0}")]
    CredentialRejected(String),

    /// No model supporting content generation could be selected.
    #[error("no eligible generation model: {0}")]
    ModelUnavailable(String),

    /// Any other provider-side failure during generation.
    #[error("provider error: {0}")]
    Provider(String),

    /// The model reply was not valid JSON after fence stripping.
    #[error("could not parse model reply: {message}")]
    ResponseParse { message: String, raw: String },

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AdverifyError {
    /// Stable machine-readable label for renderers.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InputMissing(_) => "input_missing",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Network(_) => "network_failure",
            Self::HttpStatus { .. } => "http_status_failure",
            Self::CredentialRejected(_) => "credential_rejected",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Provider(_) => "provider_error",
            Self::ResponseParse { .. } => "response_parse_failure",
            Self::Config(_) => "config_error",
        }
    }

    /// The unparsed model reply, when there is one to show.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            Self::ResponseParse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Convenient alias for results that use [`AdverifyError`].
pub type Result<T> = std::result::Result<T, AdverifyError>;
