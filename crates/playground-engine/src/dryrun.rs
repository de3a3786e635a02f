use anyhow::Result;

use crate::inline_image::InlineImage;
use crate::GenerativeBackend;

/// Offline backend: answers deterministically without credentials or network.
pub struct DryrunBackend {
    model: String,
}

impl DryrunBackend {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.trim().to_string(),
        }
    }
}

impl GenerativeBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate_text(&self, prompt: &str) -> Result<String> {
        Ok(format!("[{}] {}", self.model, prompt.trim()))
    }

    fn generate_vision(&self, image: &InlineImage, prompt: &str) -> Result<String> {
        let short_digest: String = image.sha256.chars().take(12).collect();
        Ok(format!(
            "[{}] {} image {}: {}",
            self.model,
            image.mime_type,
            short_digest,
            prompt.trim()
        ))
    }
}
