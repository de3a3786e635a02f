use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use playground_contracts::events::EventWriter;
use playground_contracts::messages::{Message, Sender};

use crate::in_flight::{InFlightSlot, Settled};
use crate::{error_chain_text, map_object, GenerativeBackend, RejectReason, SubmitOutcome};

pub const CONNECTION_ERROR_TEXT: &str = "An error occurred while connecting.";

/// Append-only transcript plus the single outstanding text request.
pub struct ChatSession {
    backend: Arc<dyn GenerativeBackend>,
    events: EventWriter,
    messages: Vec<Message>,
    in_flight: InFlightSlot<Result<String>>,
    /// Model serving the outstanding request.
    request_model: Option<String>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn GenerativeBackend>, events: EventWriter) -> Self {
        let welcome = Message::bot(format!(
            "Hello! I'm Gemini ({}). How can I help you today?",
            backend.model()
        ));
        Self {
            backend,
            events,
            messages: vec![welcome],
            in_flight: InFlightSlot::new("playground-chat"),
            request_model: None,
        }
    }

    pub fn backend(&self) -> &dyn GenerativeBackend {
        self.backend.as_ref()
    }

    /// Takes effect from the next submission; a pending request finishes on
    /// the backend it started with.
    pub fn set_backend(&mut self, backend: Arc<dyn GenerativeBackend>) {
        self.backend = backend;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Transcript as it should be rendered, with a loading placeholder while
    /// a reply is outstanding.
    pub fn display_messages(&self) -> Vec<Message> {
        let mut out = self.messages.clone();
        if self.is_pending() {
            out.push(Message::loading());
        }
        out
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Rejected(RejectReason::Empty);
        }
        if self.in_flight.is_busy() {
            return SubmitOutcome::Rejected(RejectReason::Pending);
        }

        self.push(Message::user(text));

        let backend = Arc::clone(&self.backend);
        let model = backend.model().to_string();
        let prompt = text.to_string();
        match self
            .in_flight
            .start(move || backend.generate_text(&prompt))
        {
            Ok(()) => {
                self.events.emit_quiet(
                    "chat_request_started",
                    map_object(json!({
                        "provider": self.backend.name(),
                        "model": model,
                        "prompt_chars": text.chars().count(),
                    })),
                );
                self.request_model = Some(model);
            }
            Err(err) => {
                self.record_finish(&model, Some(&err), 0);
                self.push(Message::system(CONNECTION_ERROR_TEXT));
            }
        }
        SubmitOutcome::Accepted
    }

    /// Completes the cycle if the reply has arrived; never blocks.
    pub fn poll(&mut self) -> Option<Message> {
        let settled = self.in_flight.poll()?;
        Some(self.complete(settled))
    }

    /// Blocks until the outstanding reply arrives; `None` when idle.
    pub fn wait(&mut self) -> Option<Message> {
        let settled = self.in_flight.wait()?;
        Some(self.complete(settled))
    }

    /// Submit and wait. `None` when the text was rejected.
    pub fn send(&mut self, text: &str) -> Option<Message> {
        if !self.submit(text).is_accepted() {
            return None;
        }
        if !self.is_pending() {
            return self.messages.last().cloned();
        }
        self.wait()
    }

    fn complete(&mut self, settled: Settled<Result<String>>) -> Message {
        let elapsed_ms = settled.elapsed.as_millis() as u64;
        let model = self
            .request_model
            .take()
            .unwrap_or_else(|| self.backend.model().to_string());
        let message = match settled.outcome.and_then(|reply| reply) {
            Ok(text) => {
                self.record_finish(&model, None, elapsed_ms);
                Message::bot(text)
            }
            Err(err) => {
                self.record_finish(&model, Some(&err), elapsed_ms);
                Message::system(CONNECTION_ERROR_TEXT)
            }
        };
        self.push(message.clone());
        message
    }

    fn record_finish(&self, model: &str, err: Option<&anyhow::Error>, elapsed_ms: u64) {
        self.events.emit_quiet(
            "chat_request_finished",
            map_object(json!({
                "model": model,
                "ok": err.is_none(),
                "elapsed_ms": elapsed_ms,
                "error": err
                    .map(|err| Value::String(error_chain_text(err, 512)))
                    .unwrap_or(Value::Null),
            })),
        );
    }

    fn push(&mut self, message: Message) {
        self.events
            .emit_quiet("chat_message", message.to_event_payload());
        self.messages.push(message);
    }

    pub fn count_by_sender(&self, sender: Sender) -> usize {
        self.messages
            .iter()
            .filter(|message| message.sender == sender)
            .count()
    }
}
