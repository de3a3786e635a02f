use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use playground_contracts::events::{EventPayload, EventWriter};
use playground_contracts::messages::{AppMode, Sender};
use playground_contracts::models::{ModelSelection, ModelSelector, ModelSpec};

use crate::chat::ChatSession;
use crate::config::{ClientConfig, PlaygroundConfig};
use crate::vision::VisionSession;
use crate::{build_backend, map_object};

/// Both flows plus the mode that decides where plain input goes.
pub struct Playground {
    client: ClientConfig,
    events: EventWriter,
    model_selector: ModelSelector,
    mode: AppMode,
    text_model: ModelSelection,
    vision_model: ModelSelection,
    chat: ChatSession,
    vision: VisionSession,
}

impl Playground {
    pub fn new(config: PlaygroundConfig, events: EventWriter) -> Result<Self> {
        let model_selector = ModelSelector::new(None);
        let text_model = model_selector
            .select(config.text_model.as_deref(), "text")
            .map_err(|err| anyhow!(err))?;
        let vision_model = model_selector
            .select(config.vision_model.as_deref(), "vision")
            .map_err(|err| anyhow!(err))?;

        let chat = ChatSession::new(
            build_backend(&text_model.model, &config.client)?,
            events.clone(),
        );
        let vision = VisionSession::new(
            build_backend(&vision_model.model, &config.client)?,
            events.clone(),
            config.client.max_image_dim,
        );

        events.emit(
            "session_started",
            map_object(json!({
                "text_model": text_model.model.name,
                "vision_model": vision_model.model.name,
                "api_base": config.client.api_base,
                "api_key_configured": config.client.api_key().is_some(),
                "fallback_reasons": fallback_reasons(&[&text_model, &vision_model]),
            })),
        )?;

        Ok(Self {
            client: config.client,
            events,
            model_selector,
            mode: AppMode::default(),
            text_model,
            vision_model,
            chat,
            vision,
        })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AppMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.events.emit_quiet(
            "mode_changed",
            map_object(json!({ "mode": mode.as_str() })),
        );
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatSession {
        &mut self.chat
    }

    pub fn vision(&self) -> &VisionSession {
        &self.vision
    }

    pub fn vision_mut(&mut self) -> &mut VisionSession {
        &mut self.vision
    }

    pub fn text_model(&self) -> &ModelSelection {
        &self.text_model
    }

    pub fn vision_model(&self) -> &ModelSelection {
        &self.vision_model
    }

    /// Every model `set_text_model`/`set_vision_model` can pick from, in
    /// fallback order.
    pub fn models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.model_selector.registry.list()
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn set_text_model(&mut self, requested: &str) -> Result<&ModelSelection> {
        let selection = self
            .model_selector
            .select(Some(requested), "text")
            .map_err(|err| anyhow!(err))?;
        self.chat
            .set_backend(build_backend(&selection.model, &self.client)?);
        self.record_model_change("text", &selection);
        self.text_model = selection;
        Ok(&self.text_model)
    }

    pub fn set_vision_model(&mut self, requested: &str) -> Result<&ModelSelection> {
        let selection = self
            .model_selector
            .select(Some(requested), "vision")
            .map_err(|err| anyhow!(err))?;
        self.vision
            .set_backend(build_backend(&selection.model, &self.client)?);
        self.record_model_change("vision", &selection);
        self.vision_model = selection;
        Ok(&self.vision_model)
    }

    /// Collects any outstanding replies and logs the session totals.
    pub fn finish(&mut self) -> Result<Value> {
        self.chat.wait();
        self.vision.wait();
        let mut payload = EventPayload::new();
        payload.insert(
            "messages".to_string(),
            Value::Number(self.chat.messages().len().into()),
        );
        for sender in [Sender::User, Sender::Bot, Sender::System] {
            payload.insert(
                format!("{}_messages", sender.as_str().to_ascii_lowercase()),
                Value::Number(self.chat.count_by_sender(sender).into()),
            );
        }
        payload.insert(
            "analysis_chars".to_string(),
            Value::Number(self.vision.analysis().chars().count().into()),
        );
        self.events.emit("session_finished", payload)
    }

    fn record_model_change(&self, capability: &str, selection: &ModelSelection) {
        self.events.emit_quiet(
            "model_selected",
            map_object(json!({
                "capability": capability,
                "model": selection.model.name,
                "provider": selection.model.provider,
                "requested": selection.requested,
                "fallback_reason": selection.fallback_reason,
            })),
        );
    }
}

fn fallback_reasons(selections: &[&ModelSelection]) -> Vec<String> {
    selections
        .iter()
        .filter_map(|selection| selection.fallback_reason.clone())
        .collect()
}
