//! Ad-script grounding check.
//!
//! The verifier embeds the scraped site text and the ad script into a fixed
//! instruction template, asks the model for a raw JSON judgment, and maps the
//! reply onto [`VerificationVerdict`]. Replies wrapped in a ```json fence are
//! accepted; fields the model leaves out fall back to conservative defaults.

use crate::traits::LlmClient;
use adverify_common::{AdverifyError, Result, DEFAULT_MAX_SOURCE_CHARS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Binary judgment returned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// `PASS` in any case is a pass; everything else, including garbage, fails.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("pass") {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    /// Quality score in `0..=100`.
    pub score: u8,
    /// Claims in the ad with no support in the source, in model order.
    pub hallucinations: Vec<String>,
    pub tone_consistency: String,
    pub verdict: Verdict,
}

impl VerificationVerdict {
    /// Whether the verdict agrees with the PASS policy given to the model
    /// (score above 80 and no hallucinations). Not enforced; FAIL is always
    /// consistent.
    pub fn is_consistent(&self) -> bool {
        match self.verdict {
            Verdict::Pass => self.score > 80 && self.hallucinations.is_empty(),
            Verdict::Fail => true,
        }
    }
}

/// Inputs to a single verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    source_text: String,
    ad_script: String,
    truncated: bool,
}

impl VerificationRequest {
    /// `source_text` is cut to at most `max_source_chars` characters; the ad
    /// script is kept verbatim.
    pub fn new(source_text: &str, ad_script: &str, max_source_chars: usize) -> Self {
        let (source_text, truncated) = match source_text.char_indices().nth(max_source_chars) {
            Some((cut, _)) => (source_text[..cut].to_string(), true),
            None => (source_text.to_string(), false),
        };
        Self {
            source_text,
            ad_script: ad_script.to_string(),
            truncated,
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn ad_script(&self) -> &str {
        &self.ad_script
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn prompt(&self) -> String {
        format!(
            r#"{VERIFIER_INSTRUCTIONS}
---
Source Website Text:
{source}

---
Ad Script:
{script}
"#,
            source = self.source_text,
            script = self.ad_script,
        )
    }
}

pub const VERIFIER_INSTRUCTIONS: &str = r#"You are a strict compliance and quality control officer for advertising.

Your task is to verify an 'Ad Script' against the ground truth text from a 'Source Website'.

Step 1: Analyze the 'Source Website Text' to understand the facts, features, and tone.
Step 2: Check the 'Ad Script' for any factual hallucinations (claims not supported by the website).
Step 3: Analyze if the tone of the ad matches the website's voice.
Step 4: Assign a quality score from 0-100.

Return a single valid JSON object ONLY. Do not use Markdown code blocks.
The object must have exactly these fields:
{
    "score": (integer 0-100),
    "hallucinations": ["string list of specific claims in the ad that exist nowhere on the site"],
    "tone_consistency": "Brief analysis of whether the ad voice matches the site voice",
    "verdict": "PASS" (if score > 80 and no major hallucinations) or "FAIL"
}
"#;

/// Remove a surrounding ``` fence and an optional `json` tag.
///
/// ```
/// use adverify_llm::verifier::strip_code_fence;
///
/// assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
/// ```
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = match after_open.find("```") {
        Some(close) => &after_open[..close],
        None => after_open,
    };
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => inner,
    };
    inner.trim()
}

/// Wire shape of the model's JSON. Every field is optional; types are
/// checked loosely in [`parse_verdict`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerdictWire {
    score: Option<Value>,
    hallucinations: Option<Value>,
    tone_consistency: Option<Value>,
    verdict: Option<Value>,
}

fn score_from(value: Option<Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(x) if x.is_finite() => x.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

fn text_from(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn hallucinations_from(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|v| !v.is_null())
            .map(text_from)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    }
}

/// Parse a model reply into a verdict, filling in defaults for missing
/// fields. A reply that is not a JSON object after fence stripping is an
/// [`AdverifyError::ResponseParse`] carrying the raw reply.
pub fn parse_verdict(reply: &str) -> Result<VerificationVerdict> {
    let body = strip_code_fence(reply);
    let parse_error = |message: String| AdverifyError::ResponseParse {
        message,
        raw: reply.to_string(),
    };

    let value: Value = serde_json::from_str(body).map_err(|e| parse_error(e.to_string()))?;
    if !value.is_object() {
        return Err(parse_error(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    let wire: VerdictWire =
        serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;

    Ok(VerificationVerdict {
        score: score_from(wire.score),
        hallucinations: hallucinations_from(wire.hallucinations),
        tone_consistency: wire
            .tone_consistency
            .filter(|v| !v.is_null())
            .map(text_from)
            .unwrap_or_else(|| "N/A".to_string()),
        verdict: wire
            .verdict
            .as_ref()
            .and_then(Value::as_str)
            .map(Verdict::from_label)
            .unwrap_or(Verdict::Fail),
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Runs one grounding check against a model.
pub struct Verifier<'a> {
    llm: &'a dyn LlmClient,
    max_source_chars: usize,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl<'a> Verifier<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self {
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

    pub fn request(&self, source_text: &str, ad_script: &str) -> VerificationRequest {
        VerificationRequest::new(source_text, ad_script, self.max_source_chars)
    }

    pub async fn verify(&self, source_text: &str, ad_script: &str) -> Result<VerificationVerdict> {
        let request = self.request(source_text, ad_script);
        tracing::info!(
            model = %self.llm.model_name(),
            source_chars = request.source_text().chars().count(),
            truncated = request.is_truncated(),
            script_chars = request.ad_script().chars().count(),
            "verifier.request"
        );

        let response = self
            .llm
            .generate(&request.prompt(), None, self.max_tokens, self.temperature)
            .await?;
        tracing::debug!(reply = %response.text, tokens = ?response.tokens_used, "verifier.reply");

        let verdict = parse_verdict(&response.text).inspect_err(|e| {
            tracing::warn!(error = %e, "verifier.unparseable_reply");
        })?;

        if !verdict.is_consistent() {
            tracing::warn!(
                score = verdict.score,
                hallucinations = verdict.hallucinations.len(),
                "verifier.verdict_disagrees_with_policy"
            );
        }
        tracing::info!(
            score = verdict.score,
            verdict = verdict.verdict.as_str(),
            hallucinations = verdict.hallucinations.len(),
            "verifier.done"
        );
        Ok(verdict)
    }
}
