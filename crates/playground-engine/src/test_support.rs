use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::inline_image::InlineImage;
use crate::GenerativeBackend;

type ReplyFn = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Backend whose replies come from a closure. A gated backend holds every
/// call until the test releases it, which keeps a request pending on demand.
pub(crate) struct ScriptedBackend {
    reply: Box<ReplyFn>,
    gate: Mutex<Option<Receiver<()>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn gated<F>(reply: F) -> (Arc<Self>, Sender<()>)
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::new(Self {
            reply: Box::new(reply),
            gate: Mutex::new(Some(rx)),
            calls: Mutex::new(Vec::new()),
        });
        (backend, tx)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn answer(&self, recorded: String, prompt: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(recorded);
        }
        let gate = self
            .gate
            .lock()
            .map_err(|_| anyhow!("scripted backend gate poisoned"))?;
        if let Some(rx) = gate.as_ref() {
            let _ = rx.recv();
        }
        (self.reply)(prompt)
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn generate_text(&self, prompt: &str) -> Result<String> {
        self.answer(format!("text:{prompt}"), prompt)
    }

    fn generate_vision(&self, image: &InlineImage, prompt: &str) -> Result<String> {
        self.answer(format!("vision:{}:{prompt}", image.mime_type), prompt)
    }
}
