use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::catalog::ModelId;
use super::traits::Model;
use super::types::{ChatMessage, ModelConfig, ModelResponse, TokenUsage};
use crate::app::ProviderSettings;
use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;

/// Chat model reached through an OpenAI-compatible chat completions API
///
/// Ollama, Anthropic, DeepSeek and Gemini all expose this shape, so one
/// client serves every catalog entry.
pub struct UnifiedModel {
    client: Client,
    base_url: String,
    model_name: String,
    api_key: Option<String>,
    local: bool,
}

impl UnifiedModel {
    /// Create a client for a catalog model
    ///
    /// The API key is read from the environment variable named in the
    /// provider settings. Local providers work without one.
    pub fn new(model: ModelId, settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());

        let local = model.provider().is_local();
        if api_key.is_none() && !local {
            tracing::warn!(
                model = model.id(),
                "no API key found in {}",
                settings.api_key_env.as_deref().unwrap_or("<unset>")
            );
        }

        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
                .build()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model_name: model.model_name().to_string(),
            api_key,
            local,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], config: &ModelConfig) -> serde_json::Value {
        let mut json_messages = Vec::new();

        if let Some(system) = &config.system_prompt {
            json_messages.push(json!({
                "role": "system",
                "content": system
            }));
        }

        for msg in messages {
            json_messages.push(json!({
                "role": msg.role.as_str(),
                "content": msg.content
            }));
        }

        let mut request_body = json!({
            "model": self.model_name,
            "messages": json_messages,
            "stream": false,
        });

        if let Some(temp) = config.temperature {
            request_body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = config.max_tokens {
            request_body["max_tokens"] = json!(max_tokens);
        }

        request_body
    }
}

#[async_trait]
impl Model for UnifiedModel {
    async fn chat(&self, messages: &[ChatMessage], config: &ModelConfig) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&self.request_body(messages, config));

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach model endpoint at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            anyhow::bail!("Model endpoint returned {}: {}", status, error_text);
        }

        let response_json: ChatCompletionResponse = response
            .json()
            .await
            .context("Model endpoint returned an unexpected body")?;

        let content = response_json
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Model response contained no choices")?;

        Ok(ModelResponse {
            content,
            usage: response_json.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model_name: self.model_name.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    fn is_local(&self) -> bool {
        self.local
    }
}

// Response structures (OpenAI format)

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model() -> UnifiedModel {
        let settings = ProviderSettings {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key_env: None,
        };
        UnifiedModel::new(ModelId::Qwen3Coder, &settings).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let model = model();
        let config = ModelConfig {
            temperature: Some(0.5),
            max_tokens: Some(128),
            system_prompt: Some("be brief".to_string()),
        };
        let body = model.request_body(&[ChatMessage::user("plot it")], &config);

        assert_eq!(
            body,
            json!({
                "model": "qwen3-coder",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "plot it"}
                ],
                "stream": false,
                "temperature": 0.5,
                "max_tokens": 128
            })
        );
        assert_eq!(model.base_url, "http://localhost:11434/v1");
        assert!(model.is_local());
    }

    #[test]
    fn test_completion_response_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
                      "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 4);
    }
}
