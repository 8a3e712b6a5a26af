//! One verification request, from raw inputs to a terminal [`Outcome`].
//!
//! ```text
//! IDLE ─validate─▶ REJECTED
//!   └─▶ SCRAPING ─▶ SCRAPE_FAILED
//!         └─▶ SCRAPED ─▶ VERIFYING ─▶ VERIFY_FAILED | VERIFIED
//! ```
//!
//! Every step error is caught here and becomes an outcome; nothing escapes.

use adverify_common::{AdverifyError, DEFAULT_MAX_SOURCE_CHARS, LlmConfig};
use adverify_llm::ensure_llm_ready;
use adverify_llm::verifier::{VerificationVerdict, Verifier};
use adverify_web::PageScraper;

/// Observable transitions, reported while the request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Scraping,
    Scraped { chars: usize },
    Verifying { model: String },
}

/// Terminal state of a request.
#[derive(Debug)]
pub enum Outcome {
    Rejected(AdverifyError),
    ScrapeFailed(AdverifyError),
    VerifyFailed(AdverifyError),
    Verified {
        model: String,
        source_chars: usize,
        verdict: VerificationVerdict,
    },
}

impl Outcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Outcome::Verified { .. })
    }

    pub fn error(&self) -> Option<&AdverifyError> {
        match self {
            Outcome::Rejected(e) | Outcome::ScrapeFailed(e) | Outcome::VerifyFailed(e) => Some(e),
            Outcome::Verified { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Rejected(_) => "rejected",
            Outcome::ScrapeFailed(_) => "scrape_failed",
            Outcome::VerifyFailed(_) => "verify_failed",
            Outcome::Verified { .. } => "verified",
        }
    }
}

pub struct Pipeline<'a> {
    scraper: &'a dyn PageScraper,
    llm: LlmConfig,
    max_source_chars: usize,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl<'a> Pipeline<'a> {
    pub fn new(scraper: &'a dyn PageScraper, llm: LlmConfig) -> Self {
        Self {
            scraper,
            llm,
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_max_source_chars(mut self, max_source_chars: usize) -> Self {
        self.max_source_chars = max_source_chars;
        self
    }

    pub fn with_generation(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub async fn run(&self, url: &str, ad_script: &str, mut on_stage: impl FnMut(Stage)) -> Outcome {
        if let Err(e) = self.validate(url, ad_script) {
            tracing::warn!(error = %e, "pipeline.rejected");
            return Outcome::Rejected(e);
        }

        on_stage(Stage::Scraping);
        let source = match self.scraper.scrape(url.trim()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(category = e.category(), error = %e, "pipeline.scrape_failed");
                return Outcome::ScrapeFailed(e);
            }
        };
        let source_chars = source.chars().count();
        on_stage(Stage::Scraped { chars: source_chars });

        let llm = match ensure_llm_ready(&self.llm).await {
            Ok(llm) => llm,
            Err(e) => {
                tracing::warn!(category = e.category(), error = %e, "pipeline.verify_failed");
                return Outcome::VerifyFailed(e);
            }
        };
        let model = llm.model_name().to_string();
        on_stage(Stage::Verifying {
            model: model.clone(),
        });

        let verifier = Verifier::new(llm.as_ref())
            .with_max_source_chars(self.max_source_chars)
            .with_generation(self.temperature, self.max_tokens);
        match verifier.verify(&source, ad_script).await {
            Ok(verdict) => Outcome::Verified {
                model,
                source_chars,
                verdict,
            },
            Err(e) => {
                tracing::warn!(category = e.category(), error = %e, "pipeline.verify_failed");
                Outcome::VerifyFailed(e)
            }
        }
    }

    /// Credential first, then URL, then script.
    fn validate(&self, url: &str, ad_script: &str) -> Result<(), AdverifyError> {
        let has_key = match &self.llm {
            LlmConfig::Gemini { api_key, .. } => !api_key.trim().is_empty(),
            LlmConfig::None => false,
        };
        if !has_key {
            return Err(AdverifyError::InputMissing("API credential"));
        }
        if url.trim().is_empty() {
            return Err(AdverifyError::InputMissing("target URL"));
        }
        if ad_script.trim().is_empty() {
            return Err(AdverifyError::InputMissing("ad script"));
        }
        Ok(())
    }
}
