use indexmap::IndexMap;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(normalize_model_name(name))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

/// Accepts the `models/<name>` form used by the Gemini REST paths.
fn normalize_model_name(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed.strip_prefix("models/").unwrap_or(trimmed)
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert =
        |name: &str, provider: &str, capabilities: &[&str], context_window: Option<u64>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities
                        .iter()
                        .map(|item| (*item).to_string())
                        .collect(),
                    context_window,
                },
            );
        };

    insert(DEFAULT_MODEL, "gemini", &["text", "vision"], Some(1_048_576));
    insert("gemini-2.5-pro", "gemini", &["text", "vision"], Some(1_048_576));
    insert("gemini-2.5-flash-lite", "gemini", &["text", "vision"], Some(1_048_576));
    insert("gemini-2.0-flash", "gemini", &["text", "vision"], Some(1_048_576));
    insert("dryrun-text-1", "dryrun", &["text", "vision"], Some(8192));

    map
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, DEFAULT_MODEL};

    #[test]
    fn default_model_is_first_for_both_capabilities() {
        let registry = ModelRegistry::new(None);
        assert_eq!(registry.by_capability("text")[0].name, DEFAULT_MODEL);
        assert_eq!(registry.by_capability("vision")[0].name, DEFAULT_MODEL);
    }

    #[test]
    fn list_keeps_registration_order() {
        let registry = ModelRegistry::new(None);
        let names: Vec<&str> = registry.list().map(|model| model.name.as_str()).collect();
        assert_eq!(names.first().copied(), Some(DEFAULT_MODEL));
        assert_eq!(names.last().copied(), Some("dryrun-text-1"));
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn lookup_accepts_rest_path_prefix() {
        let registry = ModelRegistry::new(None);
        let spec = registry.get("models/gemini-2.5-pro");
        assert_eq!(spec.map(|model| model.provider.as_str()), Some("gemini"));
        assert!(registry.ensure(" dryrun-text-1 ", "vision").is_some());
        assert!(registry.ensure("dryrun-text-1", "audio").is_none());
    }
}
