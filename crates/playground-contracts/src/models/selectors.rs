use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Picks the requested model when it supports `capability`, otherwise the
    /// first registered model that does, with the reason recorded.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let matched = requested
            .as_deref()
            .and_then(|name| self.registry.ensure(name, capability));
        if let Some(model) = matched {
            return Ok(ModelSelection {
                model,
                requested,
                fallback_reason: None,
            });
        }

        let fallback = self
            .registry
            .by_capability(capability)
            .into_iter()
            .next()
            .ok_or_else(|| format!("No models available for capability '{capability}'."))?;
        let fallback_reason = requested.as_deref().map(|name| {
            format!("Requested model '{name}' unavailable for capability '{capability}'.")
        });
        Ok(ModelSelection {
            model: fallback,
            requested,
            fallback_reason,
        })
    }
}
