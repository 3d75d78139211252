use serde::Serialize;
use std::fmt;

use crate::app::{ProviderSettings, ProvidersConfig};

/// Backend serving a catalog model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    Anthropic,
    DeepSeek,
    Gemini,
}

impl Provider {
    pub fn settings<'a>(&self, providers: &'a ProvidersConfig) -> &'a ProviderSettings {
        match self {
            Provider::Ollama => &providers.ollama,
            Provider::Anthropic => &providers.anthropic,
            Provider::DeepSeek => &providers.deepseek,
            Provider::Gemini => &providers.gemini,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Provider::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Ollama => "ollama",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

/// Closed set of model identifiers a role may be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelId {
    Ollama,
    Ollama3,
    Qwen3,
    Qwen3Coder,
    Gemma12BVision,
    Gemma4BVision,
    Llava7BVision,
    Qwen2Vision,
    Anthropic,
    DeepSeek,
    Gemini,
}

impl ModelId {
    pub const ALL: [ModelId; 11] = [
        ModelId::Ollama,
        ModelId::Ollama3,
        ModelId::Qwen3,
        ModelId::Qwen3Coder,
        ModelId::Gemma12BVision,
        ModelId::Gemma4BVision,
        ModelId::Llava7BVision,
        ModelId::Qwen2Vision,
        ModelId::Anthropic,
        ModelId::DeepSeek,
        ModelId::Gemini,
    ];

    /// Identifier as written in configuration
    pub fn id(&self) -> &'static str {
        match self {
            ModelId::Ollama => "ollama",
            ModelId::Ollama3 => "ollama3",
            ModelId::Qwen3 => "qwen3",
            ModelId::Qwen3Coder => "qwen3-coder",
            ModelId::Gemma12BVision => "gemma12B_v",
            ModelId::Gemma4BVision => "gemma4B_v",
            ModelId::Llava7BVision => "llava7B_v",
            ModelId::Qwen2Vision => "qwen2_v",
            ModelId::Anthropic => "anthropic",
            ModelId::DeepSeek => "deepseek",
            ModelId::Gemini => "gemini",
        }
    }

    /// Model name sent to the provider
    pub fn model_name(&self) -> &'static str {
        match self {
            ModelId::Ollama => "llama3.2",
            ModelId::Ollama3 => "llama3",
            ModelId::Qwen3 => "qwen3",
            ModelId::Qwen3Coder => "qwen3-coder",
            ModelId::Gemma12BVision => "gemma3:12b",
            ModelId::Gemma4BVision => "gemma3:4b",
            ModelId::Llava7BVision => "llava:7b",
            ModelId::Qwen2Vision => "qwen2.5vl",
            ModelId::Anthropic => "claude-3-5-sonnet-latest",
            ModelId::DeepSeek => "deepseek-chat",
            ModelId::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ModelId::Anthropic => Provider::Anthropic,
            ModelId::DeepSeek => Provider::DeepSeek,
            ModelId::Gemini => Provider::Gemini,
            _ => Provider::Ollama,
        }
    }

    /// Whether the model accepts image input
    pub fn is_vision(&self) -> bool {
        matches!(
            self,
            ModelId::Gemma12BVision
                | ModelId::Gemma4BVision
                | ModelId::Llava7BVision
                | ModelId::Qwen2Vision
        )
    }

    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id.trim())
    }

    /// Look up `id`, falling back to the local default model when unrecognised
    pub fn resolve(id: &str) -> Self {
        match Self::parse(id) {
            Some(model) => model,
            None => {
                tracing::warn!(model = id, "unknown model id, falling back to 'ollama'");
                ModelId::Ollama
            }
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_parses_back() {
        for model in ModelId::ALL {
            assert_eq!(ModelId::parse(model.id()), Some(model));
        }
    }

    #[test]
    fn test_unknown_id_falls_back_to_ollama() {
        assert_eq!(ModelId::resolve("gpt-17"), ModelId::Ollama);
        assert_eq!(ModelId::resolve(""), ModelId::Ollama);
    }

    #[test]
    fn test_provider_mapping() {
        assert_eq!(ModelId::Qwen3Coder.provider(), Provider::Ollama);
        assert_eq!(ModelId::Gemini.provider(), Provider::Gemini);
        assert!(ModelId::Llava7BVision.is_vision());
        assert!(!ModelId::DeepSeek.provider().is_local());

        let providers = ProvidersConfig::default();
        assert_eq!(
            Provider::Anthropic.settings(&providers).api_key_env.as_deref(),
            Some("ANTHROPIC_API_KEY")
        );
    }
}
