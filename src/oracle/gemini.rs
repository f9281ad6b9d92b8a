use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{http_client, post_json, read_api_key, AnalysisRequest, NormalizeRequest, Oracle};
use crate::config::OracleConfig;
use crate::error::OracleError;

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com";

/// Oracle backed by the Gemini `generateContent` endpoint.
///
/// `POST {url}/v1beta/models/{model}:generateContent?key=<key>`. The API key
/// comes from `oracle.api_key_env` (default `GEMINI_API_KEY`).
pub struct GeminiOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl GeminiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let api_key = read_api_key(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url,
            model: config.model.clone(),
            api_key,
        })
    }

    async fn generate(&self, prompt: String, json_output: bool) -> Result<String, OracleError> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if json_output {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        let endpoint = format!("{}/v1beta/models/{}:generateContent", self.url, self.model);
        let request = self
            .client
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())]);
        let response = post_json(request, &body, "Gemini").await?;
        Ok(response_text(&response))
    }
}

/// Concatenated text parts of the first candidate. Empty when there is none.
fn response_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Oracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn normalize(&self, request: &NormalizeRequest) -> Result<String, OracleError> {
        let text = self.generate(request.prompt(), true).await?;
        if text.trim().is_empty() {
            return Ok("[]".to_string());
        }
        Ok(text)
    }

    async fn analyze_view(&self, request: &AnalysisRequest) -> Result<String, OracleError> {
        self.generate(request.prompt(), false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_parts() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[{\"name\":" }, { "text": "\"a\",\"value\":1}]" }] }
            }]
        });
        assert_eq!(response_text(&body), "[{\"name\":\"a\",\"value\":1}]");
    }

    #[test]
    fn response_text_empty_without_candidates() {
        assert_eq!(response_text(&json!({ "candidates": [] })), "");
        assert_eq!(response_text(&json!({})), "");
    }
}
