use anyhow::Result;
use std::sync::Arc;

use super::catalog::ModelId;
use super::traits::Model;
use super::types::ModelConfig;
use super::unified::UnifiedModel;
use crate::app::{ProvidersConfig, RoleSettings, RolesConfig};

/// Factory for creating model instances from the role configuration
pub struct ModelFactory;

impl ModelFactory {
    /// Create a model from a catalog identifier
    ///
    /// Unknown identifiers fall back to the local `ollama` entry.
    pub fn create(model_id: &str, providers: &ProvidersConfig) -> Result<Arc<dyn Model>> {
        let id = ModelId::resolve(model_id);
        let model = UnifiedModel::new(id, id.provider().settings(providers))?;
        Ok(Arc::new(model))
    }

    /// Create the model and generation settings bound to a role
    pub fn for_role(
        settings: &RoleSettings,
        providers: &ProvidersConfig,
    ) -> Result<(Arc<dyn Model>, ModelConfig)> {
        let model = Self::create(&settings.model, providers)?;
        Ok((model, ModelConfig::from(settings)))
    }

    /// Supported model ids with provider and concrete model name
    pub fn list_supported() -> Vec<(ModelId, String)> {
        ModelId::ALL
            .into_iter()
            .map(|id| (id, format!("{}/{}", id.provider(), id.model_name())))
            .collect()
    }

    /// Role bindings as `(role, configured id, resolved id)`
    pub fn role_bindings(roles: &RolesConfig) -> Vec<(&'static str, String, ModelId)> {
        [
            ("generator", &roles.generator),
            ("critic", &roles.critic),
            ("repairer", &roles.repairer),
            ("deliverer", &roles.deliverer),
        ]
        .into_iter()
        .map(|(role, settings)| {
            let resolved = ModelId::parse(&settings.model).unwrap_or(ModelId::Ollama);
            (role, settings.model.clone(), resolved)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolves_unknown_to_fallback() {
        let model = ModelFactory::create("not-a-model", &ProvidersConfig::default()).unwrap();
        assert_eq!(model.name(), ModelId::Ollama.model_name());
        assert!(model.is_local());
    }

    #[test]
    fn test_for_role_carries_generation_settings() {
        let settings = RoleSettings {
            model: "deepseek".to_string(),
            temperature: 0.1,
            max_tokens: 512,
        };
        let (model, config) = ModelFactory::for_role(&settings, &ProvidersConfig::default()).unwrap();
        assert_eq!(model.name(), "deepseek-chat");
        assert!(!model.is_local());
        assert_eq!(config.max_tokens, Some(512));
    }

    #[test]
    fn test_role_bindings_cover_all_roles() {
        let mut roles = RolesConfig::default();
        roles.critic.model = "bogus".to_string();
        let bindings = ModelFactory::role_bindings(&roles);
        assert_eq!(bindings.len(), 4);
        assert_eq!(bindings[1].0, "critic");
        assert_eq!(bindings[1].2, ModelId::Ollama);
        assert_eq!(ModelFactory::list_supported().len(), ModelId::ALL.len());
    }
}
