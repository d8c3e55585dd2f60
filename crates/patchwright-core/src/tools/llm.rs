//! OpenAI-compatible chat-completions client used as the patch generator.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PatchGenerator, ToolError};

#[derive(Debug, Clone)]
pub struct OpenAiPatchGenerator {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    headers: HashMap<String, String>,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl OpenAiPatchGenerator {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.2,
            max_tokens: 4096,
            headers: HashMap::new(),
            timeout,
            http_client,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, instructions: &str, context: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: instructions.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: context.to_string(),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl PatchGenerator for OpenAiPatchGenerator {
    async fn generate(&self, instructions: &str, context: &str) -> Result<String, ToolError> {
        let mut builder = self
            .http_client
            .post(self.endpoint())
            .json(&self.request_body(instructions, context));

        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool: "patch-generator".to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                ToolError::unavailable("patch-generator", e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ToolError::Http(format!(
                "chat completion failed ({status}): {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        debug!(model = %self.model, chars = content.len(), "patch generated");
        Ok(content)
    }
}
