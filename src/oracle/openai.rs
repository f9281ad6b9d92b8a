use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{http_client, post_json, read_api_key, AnalysisRequest, NormalizeRequest, Oracle};
use crate::config::OracleConfig;
use crate::error::OracleError;

const DEFAULT_URL: &str = "https://api.openai.com";

/// Oracle backed by an OpenAI-compatible `POST /v1/chat/completions` endpoint.
pub struct OpenAiOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiOracle {
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

    async fn complete(&self, prompt: String) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key));
        let response = post_json(request, &body, "OpenAI").await?;
        message_content(&response)
    }
}

fn message_content(response: &Value) -> Result<String, OracleError> {
    let choice = response
        .pointer("/choices/0/message")
        .ok_or_else(|| OracleError::MalformedResponse("missing choices[0].message".into()))?;
    Ok(choice
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn normalize(&self, request: &NormalizeRequest) -> Result<String, OracleError> {
        let text = self.complete(request.prompt()).await?;
        if text.trim().is_empty() {
            return Ok("[]".to_string());
        }
        Ok(text)
    }

    async fn analyze_view(&self, request: &AnalysisRequest) -> Result<String, OracleError> {
        self.complete(request.prompt()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_reads_first_choice() {
        let body = json!({ "choices": [{ "message": { "role": "assistant", "content": "[]" } }] });
        assert_eq!(message_content(&body).unwrap(), "[]");
    }

    #[test]
    fn message_content_requires_choices() {
        let err = message_content(&json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }
}
