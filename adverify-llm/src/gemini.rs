use crate::traits::{LlmClient, LlmResponse, ModelCatalog, ModelInfo};
use adverify_common::{AdverifyError, Result, GEMINI_ENDPOINT};
use adverify_http::{Auth, HttpClient, HttpError, RequestOpts};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const CATALOG_PAGE_SIZE: &str = "1000";
const MAX_CATALOG_PAGES: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

/// Google Gemini API client.
///
/// Requires a valid API key and internet access. The key travels as the
/// `key` query parameter, which the HTTP layer redacts from logs.
pub struct GeminiClient {
    http: HttpClient,
    api_key: String,
    model: String,
}

fn model_id(model: &str) -> &str {
    let model = model.trim();
    model.strip_prefix("models/").unwrap_or(model)
}

impl GeminiClient {
    /// Create a client against the public endpoint.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, GEMINI_ENDPOINT)
    }

    /// Create a client against another endpoint (proxies, tests).
    pub fn with_base_url(api_key: String, model: String, base_url: &str) -> Result<Self> {
        let http = HttpClient::new(base_url)
            .map_err(|e| AdverifyError::Config(format!("Failed to create HTTP client: {e}")))?
            .with_timeout(GENERATE_TIMEOUT);

        Ok(Self {
            http,
            api_key,
            model: model_id(&model).to_string(),
        })
    }

    /// Same credentials and endpoint, different model. Accepts a bare id or
    /// the `models/...` resource name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model_id(&model.into()).to_string();
        self
    }

    fn opts<'a>(&'a self, query: Vec<(&'a str, Cow<'a, str>)>) -> RequestOpts<'a> {
        RequestOpts {
            auth: Some(Auth::Query {
                name: "key",
                value: Cow::Borrowed(self.api_key.as_str()),
            }),
            query: (!query.is_empty()).then_some(query),
            ..Default::default()
        }
    }
}

/// Translate transport/API failures into the request error taxonomy.
fn classify(err: HttpError) -> AdverifyError {
    match err {
        HttpError::Api {
            status, message, ..
        } => match status.as_u16() {
            401 | 403 => AdverifyError::CredentialRejected(message),
            400 if message.to_ascii_lowercase().contains("api key") => {
                AdverifyError::CredentialRejected(message)
            }
            429 => AdverifyError::Provider(format!("Rate limit exceeded: {message}")),
            _ => AdverifyError::Provider(format!("Gemini API error ({status}): {message}")),
        },
        HttpError::Network(msg) => AdverifyError::Network(msg),
        HttpError::Decode(msg, _) => {
            AdverifyError::Provider(format!("Failed to parse Gemini response: {msg}"))
        }
        HttpError::Url(msg) | HttpError::Build(msg) => AdverifyError::Config(msg),
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let path = format!("models/{}:generateContent", self.model);

        let generation_config = (max_tokens.is_some() || temperature.is_some()).then_some(
            GeminiGenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config,
            system_instruction: system_prompt.map(|sys| GeminiContent {
                parts: vec![GeminiPart {
                    text: sys.to_string(),
                }],
            }),
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "gemini.generate");

        let gemini_response: GeminiResponse = self
            .http
            .post_json_opts(&path, &request, self.opts(Vec::new()))
            .await
            .map_err(classify)?;

        if let Some(reason) = gemini_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(AdverifyError::Provider(format!(
                "Prompt blocked by Gemini: {reason}"
            )));
        }

        let candidate = gemini_response.candidates.first().ok_or_else(|| {
            AdverifyError::Provider("No candidates returned from Gemini".to_string())
        })?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(AdverifyError::Provider(
                "Content blocked by Gemini safety filters".to_string(),
            ));
        }

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(AdverifyError::Provider(
                "No text content in Gemini response".to_string(),
            ));
        }

        Ok(LlmResponse {
            text,
            model: Some(self.model.clone()),
            tokens_used: gemini_response
                .usage_metadata
                .and_then(|u| u.total_token_count),
            finish_reason: candidate.finish_reason.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelCatalog for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_CATALOG_PAGES {
            let mut query = vec![("pageSize", Cow::Borrowed(CATALOG_PAGE_SIZE))];
            if let Some(token) = &page_token {
                query.push(("pageToken", Cow::Owned(token.clone())));
            }

            let page: GeminiModelList = self
                .http
                .get_json("models", self.opts(query))
                .await
                .map_err(classify)?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(models)
    }
}
