use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

use playground_contracts::models::ModelSpec;

pub mod chat;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod in_flight;
pub mod inline_image;
pub mod playground;
pub mod vision;

#[cfg(test)]
mod test_support;

pub use chat::{ChatSession, CONNECTION_ERROR_TEXT};
pub use config::{ClientConfig, PlaygroundConfig};
pub use dryrun::DryrunBackend;
pub use gemini::GeminiClient;
pub use inline_image::{ImagePreview, InlineImage};
pub use playground::Playground;
pub use vision::{VisionSession, DEFAULT_VISION_PROMPT, IMAGE_PROCESSING_ERROR_TEXT};

/// The request collaborator shared by the chat and vision flows.
///
/// Implementations turn anything they can describe (missing credentials,
/// provider errors) into reply text. `Err` is left for failures they cannot
/// describe; sessions render those as a generic error message.
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn generate_text(&self, prompt: &str) -> Result<String>;
    fn generate_vision(&self, image: &InlineImage, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    Pending,
    NoImage,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::Pending => "pending",
            RejectReason::NoImage => "no_image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

pub fn build_backend(
    model: &ModelSpec,
    config: &ClientConfig,
) -> Result<Arc<dyn GenerativeBackend>> {
    match model.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::new(config.clone(), &model.name)?)),
        "dryrun" => Ok(Arc::new(DryrunBackend::new(&model.name))),
        other => bail!("no backend for provider '{other}' (model {})", model.name),
    }
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        let detail = provider_error_message(&body).unwrap_or_else(|| truncate_text(&body, 512));
        bail!("{provider} request failed ({code}): {detail}");
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Pulls `error.message` out of a Google-style error body.
fn provider_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
