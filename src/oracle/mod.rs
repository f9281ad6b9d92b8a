//! Transformation oracle abstraction and providers.
//!
//! Defines the [`Oracle`] trait with its two operations and the concrete
//! backends:
//! - **[`GeminiOracle`]**: Google `generateContent` API.
//! - **[`OpenAiOracle`]**: any OpenAI-compatible chat completions endpoint.
//! - **[`RulesOracle`]**: deterministic offline header mapper, no network.
//! - **[`DisabledOracle`]**: fails every call.
//!
//! # Provider Selection
//!
//! Use [`create_oracle`] to build the provider named by the configuration.
//! Credentials are read from the environment once, here, and never again.
//!
//! # Failure policy
//!
//! Providers never retry. A transport error or non-2xx status maps to
//! [`OracleError::Unavailable`]; a response body that cannot be decoded maps
//! to [`OracleError::MalformedResponse`]. Whether the returned *text* is valid
//! JSON is the normalizer's concern.

mod gemini;
mod openai;
mod rules;

pub use gemini::GeminiOracle;
pub use openai::OpenAiOracle;
pub use rules::RulesOracle;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::{RawRecord, UploadDomain, ViewId};
use crate::schema;

/// A normalization request: map a raw sample onto a domain's target schema.
#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub domain: UploadDomain,
    /// Target schema text from [`schema::describe`].
    pub schema: String,
    /// Bounded prefix of the raw records.
    pub sample: Vec<RawRecord>,
}

impl NormalizeRequest {
    pub fn new(domain: UploadDomain, sample: Vec<RawRecord>) -> Self {
        Self {
            domain,
            schema: schema::describe(domain),
            sample,
        }
    }

    pub fn prompt(&self) -> String {
        let raw = serde_json::to_string(&self.sample).unwrap_or_else(|_| "[]".to_string());
        format!(
            "You are a data transformation expert.\n\
             I have raw {label} data uploaded from a spreadsheet which might have messy headers or different formats.\n\
             Your task is to extract relevant data and transform it into a strict JSON array following this schema:\n\n\
             TARGET SCHEMA:\n{schema}\n\n\
             RULES:\n\
             1. Analyze the RAW DATA below. Identify columns that match the meaning of the target schema keys.\n\
             2. Rename keys to match the target schema exactly.\n\
             3. Convert values to the correct type (remove commas and currency symbols, convert strings to numbers).\n\
             4. Keep one output object per relevant input row, in input order.\n\
             5. Return ONLY the JSON array. No markdown, no explanations.\n\
             6. If the raw data is completely irrelevant, return an empty array [].\n\n\
             RAW DATA:\n{raw}\n",
            label = self.domain.label(),
            schema = self.schema,
            raw = raw,
        )
    }
}

/// A view analysis request: summarize one view's dataset in a fixed role.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub view: ViewId,
    pub domain: UploadDomain,
    pub role: &'static str,
    /// The dataset's records as a JSON array.
    pub data: Value,
    pub language: String,
    pub max_chars: usize,
}

impl AnalysisRequest {
    /// Build a request for a view. Returns `None` for views without an analysis role.
    pub fn for_view(
        view: ViewId,
        data: Value,
        language: impl Into<String>,
        max_chars: usize,
    ) -> Option<Self> {
        let domain = view.backing_domain()?;
        Some(Self {
            view,
            domain,
            role: role_for(view)?,
            data,
            language: language.into(),
            max_chars,
        })
    }

    pub fn prompt(&self) -> String {
        let data = serde_json::to_string(&self.data).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{role}\n\n\
             [DATA UNDER ANALYSIS]\n{label} data: {data}\n\n\
             Writing rules:\n\
             1. Write in {language}.\n\
             2. Keep a professional, insightful tone.\n\
             3. Output plain text without HTML tags (Markdown is allowed).\n\
             4. Organize the key points as bullet points.\n\
             5. Stay within {max_chars} characters.\n",
            role = self.role,
            label = self.domain.label(),
            data = data,
            language = self.language,
            max_chars = self.max_chars,
        )
    }
}

/// The fixed role description for a view, if the view is analyzed at all.
pub fn role_for(view: ViewId) -> Option<&'static str> {
    match view {
        ViewId::Flagship => Some(
            "As a sales performance analyst, analyze the current sales trend and target \
             attainment, and propose three key action items to grow next month's sales.",
        ),
        ViewId::Market => Some(
            "As a market strategist, identify our strengths and weaknesses against competitors \
             and lay out an aggressive marketing strategy to grow market share.",
        ),
        ViewId::Category => Some(
            "As a merchandiser, separate fast-selling products (best sellers) from products \
             accumulating stock (slow movers) and suggest how to improve inventory turnover.",
        ),
        ViewId::Voc => Some(
            "As a customer experience specialist, summarize the main complaints and praise points \
             and derive service improvements that raise brand loyalty.",
        ),
        ViewId::SalesReview | ViewId::Channel | ViewId::Profit => None,
    }
}

/// Capability interface over the external transformation service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Map the sample onto the target schema. Returns the oracle's raw text,
    /// expected to be a JSON array.
    async fn normalize(&self, request: &NormalizeRequest) -> Result<String, OracleError>;

    /// Free-form analysis text for a view's dataset. May be empty.
    async fn analyze_view(&self, request: &AnalysisRequest) -> Result<String, OracleError>;
}

// ============ Disabled Provider ============

/// Used when `oracle.provider = "disabled"`. Every call fails.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn normalize(&self, _request: &NormalizeRequest) -> Result<String, OracleError> {
        Err(OracleError::Disabled)
    }

    async fn analyze_view(&self, _request: &AnalysisRequest) -> Result<String, OracleError> {
        Err(OracleError::Disabled)
    }
}

// ============ Shared helpers ============

/// Build the provider named by `config.provider`.
///
/// # Errors
///
/// Unknown provider, or a network provider whose API key variable is unset.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiOracle::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiOracle::new(config)?)),
        "rules" => Ok(Arc::new(RulesOracle)),
        "disabled" => Ok(Arc::new(DisabledOracle)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

fn read_api_key(config: &OracleConfig) -> Result<String> {
    let var = config.key_env();
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!(
            "{} environment variable not set (required by the {} oracle)",
            var,
            config.provider
        ),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST a JSON body and decode a JSON response, mapping failures onto the
/// oracle taxonomy.
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
    provider: &str,
) -> Result<Value, OracleError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| OracleError::Unavailable(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(OracleError::Unavailable(format!(
            "{} API error {}: {}",
            provider,
            status,
            truncate(&body_text, 300)
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| OracleError::MalformedResponse(format!("{} response body: {}", provider, e)))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
