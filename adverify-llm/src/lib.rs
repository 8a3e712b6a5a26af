//! Generative-model integration for adverify.
//!
//! This crate exposes the provider-agnostic [`traits::LlmClient`] and
//! [`traits::ModelCatalog`] interfaces, the Gemini implementation, model
//! selection, and the ad-script [`verifier`].
//!
//! # Examples
//! ```no_run
//! use adverify_common::{LlmConfig, Result};
//! use adverify_llm::{ensure_llm_ready, verifier::Verifier};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let cfg = LlmConfig::gemini("my-api-key", None); // model picked from the catalog
//! let client = ensure_llm_ready(&cfg).await?;
//! let verdict = Verifier::new(client.as_ref())
//!     .verify("Our coffee is organic.", "Organic coffee, roasted daily!")
//!     .await?;
//! println!("{} ({})", verdict.verdict.as_str(), verdict.score);
//! # Ok(())
//! # }
//! ```
pub mod catalog;
pub mod gemini;
pub mod traits;
pub mod verifier;

use adverify_common::{AdverifyError, LlmConfig, GEMINI_ENDPOINT};
use gemini::GeminiClient;
use std::sync::Arc;
use traits::LlmClient;

/// Model used only for the catalog call, before a real model is chosen.
const UNRESOLVED_MODEL: &str = "unresolved";

/// Build a ready-to-use client: validate the credential and resolve the
/// model, consulting the provider catalog when none is configured.
pub async fn ensure_llm_ready(
    config: &LlmConfig,
) -> adverify_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        LlmConfig::Gemini {
            api_key, base_url, ..
        } => {
            if api_key.trim().is_empty() {
                return Err(AdverifyError::InputMissing("API credential"));
            }
            let endpoint = base_url.as_deref().unwrap_or(GEMINI_ENDPOINT);
            let client = GeminiClient::with_base_url(
                api_key.trim().to_string(),
                UNRESOLVED_MODEL.to_string(),
                endpoint,
            )?;

            let model = match config.configured_model() {
                Some(model) => model.to_string(),
                None => catalog::resolve_model(&client).await?,
            };
            let client = client.with_model(model);
            tracing::info!(model = %client.model_name(), "llm.ready");
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(AdverifyError::Config("No LLM configured".to_string())),
    }
}
