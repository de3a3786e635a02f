use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Smallest accepted `max_image_dim`; lower limits are raised to it.
pub const MIN_IMAGE_DIM: u32 = 64;

const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// Settings handed to a backend at construction. Nothing in the request path
/// reads the process environment; [`ClientConfig::from_env`] is the only
/// place that does.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    /// `None` sends requests without a client-side timeout.
    pub request_timeout: Option<Duration>,
    /// Longest edge for images sent to the vision endpoint; `None` sends the
    /// file bytes unchanged. Never below [`MIN_IMAGE_DIM`] when set.
    pub max_image_dim: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: None,
            max_image_dim: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| clean_value(lookup(key));
        let api_key = API_KEY_VARS.iter().find_map(|key| read(*key));
        let api_base = read("GEMINI_API_BASE")
            .map(|value| normalize_api_base(&value))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let request_timeout = read("PLAYGROUND_REQUEST_TIMEOUT")
            .and_then(|value| value.parse::<f64>().ok())
            .and_then(timeout_from_secs);
        let max_image_dim = read("PLAYGROUND_MAX_IMAGE_DIM")
            .and_then(|value| value.parse::<u32>().ok())
            .and_then(image_dim_limit);

        Self {
            api_key,
            api_base,
            request_timeout,
            max_image_dim,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(value) = clean_value(api_key) {
            self.api_key = Some(value);
        }
        self
    }

    pub fn with_api_base(mut self, api_base: Option<String>) -> Self {
        if let Some(value) = clean_value(api_base).map(|value| normalize_api_base(&value)) {
            if !value.is_empty() {
                self.api_base = value;
            }
        }
        self
    }

    pub fn with_request_timeout_secs(mut self, seconds: Option<f64>) -> Self {
        if let Some(timeout) = seconds.and_then(timeout_from_secs) {
            self.request_timeout = Some(timeout);
        }
        self
    }

    pub fn with_max_image_dim(mut self, max_dim: Option<u32>) -> Self {
        if let Some(value) = max_dim.and_then(image_dim_limit) {
            self.max_image_dim = Some(value);
        }
        self
    }
}

/// Client settings plus the models each flow asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaygroundConfig {
    pub client: ClientConfig,
    pub text_model: Option<String>,
    pub vision_model: Option<String>,
}

impl PlaygroundConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            client: ClientConfig::from_lookup(&lookup),
            text_model: clean_value(lookup("PLAYGROUND_TEXT_MODEL")),
            vision_model: clean_value(lookup("PLAYGROUND_VISION_MODEL")),
        }
    }

    pub fn with_models(mut self, text_model: Option<String>, vision_model: Option<String>) -> Self {
        if let Some(model) = clean_value(text_model) {
            self.text_model = Some(model);
        }
        if let Some(model) = clean_value(vision_model) {
            self.vision_model = Some(model);
        }
        self
    }
}

fn clean_value(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// `0` means unset; anything else is clamped up to [`MIN_IMAGE_DIM`].
fn image_dim_limit(value: u32) -> Option<u32> {
    (value > 0).then_some(value.max(MIN_IMAGE_DIM))
}

fn timeout_from_secs(seconds: f64) -> Option<Duration> {
    if seconds.is_finite() && seconds > 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}
