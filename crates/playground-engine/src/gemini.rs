use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::inline_image::InlineImage;
use crate::{error_chain_text, response_json_or_error, GenerativeBackend};

pub const MISSING_KEY_TEXT: &str =
    "⚠️ Error: API key is not configured. Set GEMINI_API_KEY or pass --api-key.";
pub const MISSING_KEY_VISION_TEXT: &str = "⚠️ Error: API key is not configured.";
pub const EMPTY_TEXT_REPLY: &str = "No response.";
pub const EMPTY_VISION_REPLY: &str = "Could not analyze the image.";

const ERROR_DETAIL_MAX_CHARS: usize = 512;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` client for one model.
pub struct GeminiClient {
    config: ClientConfig,
    model: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: ClientConfig, model: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            config,
            model: model.trim().to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn generate_content(&self, api_key: &str, parts: Vec<Value>) -> Result<Value> {
        let endpoint = self.endpoint();
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
        });
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }

    /// Collapses a call result into display text: provider failures become
    /// `API error: ...`, empty candidates become `empty_reply`.
    fn reply_text(result: Result<Value>, empty_reply: &str) -> String {
        match result {
            Ok(payload) => {
                if let Some(reason) = blocked_reason(&payload) {
                    return format!("API error: response blocked ({reason})");
                }
                let text = extract_candidate_text(&payload);
                if text.trim().is_empty() {
                    empty_reply.to_string()
                } else {
                    text
                }
            }
            Err(err) => format!(
                "API error: {}",
                error_chain_text(&err, ERROR_DETAIL_MAX_CHARS)
            ),
        }
    }
}

impl GenerativeBackend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate_text(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = self.config.api_key() else {
            return Ok(MISSING_KEY_TEXT.to_string());
        };
        let parts = vec![json!({ "text": prompt })];
        Ok(Self::reply_text(
            self.generate_content(api_key, parts),
            EMPTY_TEXT_REPLY,
        ))
    }

    fn generate_vision(&self, image: &InlineImage, prompt: &str) -> Result<String> {
        let Some(api_key) = self.config.api_key() else {
            return Ok(MISSING_KEY_VISION_TEXT.to_string());
        };
        let parts = vec![image.to_part(), json!({ "text": prompt })];
        Ok(Self::reply_text(
            self.generate_content(api_key, parts),
            EMPTY_VISION_REPLY,
        ))
    }
}

/// Concatenated text parts of the first candidate, skipping thought parts.
fn extract_candidate_text(payload: &Value) -> String {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = String::new();
    for part in parts {
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            out.push_str(text);
        }
    }
    out
}

fn blocked_reason(payload: &Value) -> Option<String> {
    let has_candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(|rows| !rows.is_empty())
        .unwrap_or(false);
    if has_candidates {
        return None;
    }
    payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
