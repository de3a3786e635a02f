use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Value};

use playground_contracts::events::EventWriter;

use crate::in_flight::{InFlightSlot, Settled};
use crate::inline_image::{ImagePreview, InlineImage};
use crate::{error_chain_text, map_object, GenerativeBackend, RejectReason, SubmitOutcome};

pub const DEFAULT_VISION_PROMPT: &str = "Describe this image in detail.";
pub const IMAGE_PROCESSING_ERROR_TEXT: &str = "Error processing image.";

/// One selected image, one prompt, one analysis result.
pub struct VisionSession {
    backend: Arc<dyn GenerativeBackend>,
    events: EventWriter,
    max_image_dim: Option<u32>,
    selected: Option<ImagePreview>,
    prompt: String,
    analysis: String,
    in_flight: InFlightSlot<Result<String>>,
    /// Model serving the outstanding analysis.
    request_model: Option<String>,
}

impl VisionSession {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        events: EventWriter,
        max_image_dim: Option<u32>,
    ) -> Self {
        Self {
            backend,
            events,
            max_image_dim,
            selected: None,
            prompt: DEFAULT_VISION_PROMPT.to_string(),
            analysis: String::new(),
            in_flight: InFlightSlot::new("playground-vision"),
            request_model: None,
        }
    }

    pub fn backend(&self) -> &dyn GenerativeBackend {
        self.backend.as_ref()
    }

    pub fn set_backend(&mut self, backend: Arc<dyn GenerativeBackend>) {
        self.backend = backend;
    }

    pub fn selected(&self) -> Option<&ImagePreview> {
        self.selected.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
    }

    /// Empty until an analysis finishes, and again after each new selection.
    pub fn analysis(&self) -> &str {
        &self.analysis
    }

    pub fn is_analyzing(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Replaces the selection and clears the previous result. Files that
    /// cannot be read as images leave the current state untouched.
    pub fn select_file(&mut self, path: &Path) -> Result<&ImagePreview> {
        if self.in_flight.is_busy() {
            bail!("an image analysis is still running");
        }
        let preview = ImagePreview::inspect(path)?;
        self.events.emit_quiet(
            "vision_file_selected",
            map_object(json!({
                "image_path": preview.path.to_string_lossy().to_string(),
                "mime_type": preview.mime_type,
                "width": preview.width,
                "height": preview.height,
                "bytes": preview.byte_len,
                "image_sha256": preview.sha256,
            })),
        );
        self.analysis.clear();
        Ok(self.selected.insert(preview))
    }

    pub fn analyze(&mut self) -> SubmitOutcome {
        let Some(selected) = self.selected.as_ref() else {
            return SubmitOutcome::Rejected(RejectReason::NoImage);
        };
        if self.prompt.trim().is_empty() {
            return SubmitOutcome::Rejected(RejectReason::Empty);
        }
        if self.in_flight.is_busy() {
            return SubmitOutcome::Rejected(RejectReason::Pending);
        }

        let path = selected.path.clone();
        let image_sha256 = selected.sha256.clone();
        let prompt = self.prompt.clone();
        let max_dim = self.max_image_dim;
        let backend = Arc::clone(&self.backend);
        let model = backend.model().to_string();
        self.analysis.clear();

        let started = self.in_flight.start(move || {
            let image = InlineImage::from_path(&path, max_dim)?;
            backend.generate_vision(&image, &prompt)
        });
        match started {
            Ok(()) => {
                self.events.emit_quiet(
                    "vision_analysis_started",
                    map_object(json!({
                        "provider": self.backend.name(),
                        "model": model,
                        "image_sha256": image_sha256,
                        "prompt_chars": self.prompt.chars().count(),
                    })),
                );
                self.request_model = Some(model);
            }
            Err(err) => {
                self.record_finish(&model, Some(&err), 0);
                self.analysis = IMAGE_PROCESSING_ERROR_TEXT.to_string();
            }
        }
        SubmitOutcome::Accepted
    }

    pub fn poll(&mut self) -> Option<String> {
        let settled = self.in_flight.poll()?;
        Some(self.complete(settled))
    }

    pub fn wait(&mut self) -> Option<String> {
        let settled = self.in_flight.wait()?;
        Some(self.complete(settled))
    }

    fn complete(&mut self, settled: Settled<Result<String>>) -> String {
        let elapsed_ms = settled.elapsed.as_millis() as u64;
        let model = self
            .request_model
            .take()
            .unwrap_or_else(|| self.backend.model().to_string());
        self.analysis = match settled.outcome.and_then(|reply| reply) {
            Ok(text) => {
                self.record_finish(&model, None, elapsed_ms);
                text
            }
            Err(err) => {
                self.record_finish(&model, Some(&err), elapsed_ms);
                IMAGE_PROCESSING_ERROR_TEXT.to_string()
            }
        };
        self.analysis.clone()
    }

    fn record_finish(&self, model: &str, err: Option<&anyhow::Error>, elapsed_ms: u64) {
        self.events.emit_quiet(
            "vision_analysis_finished",
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
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use anyhow::bail;
    use image::{Rgb, RgbImage};
    use playground_contracts::events::EventWriter;

    use serde_json::Value;

    use super::{VisionSession, DEFAULT_VISION_PROMPT, IMAGE_PROCESSING_ERROR_TEXT};
    use crate::dryrun::DryrunBackend;
    use crate::test_support::ScriptedBackend;
    use crate::{RejectReason, SubmitOutcome};

    fn write_png(path: &Path, width: u32, height: u32) -> anyhow::Result<()> {
        RgbImage::from_pixel(width, height, Rgb([10, 120, 200])).save(path)?;
        Ok(())
    }

    fn described() -> std::sync::Arc<ScriptedBackend> {
        ScriptedBackend::new(|prompt| Ok(format!("analysis of: {prompt}")))
    }

    #[test]
    fn analyze_without_selection_is_a_no_op() {
        let backend = described();
        let mut vision = VisionSession::new(backend.clone(), EventWriter::disabled("s"), None);

        assert_eq!(
            vision.analyze(),
            SubmitOutcome::Rejected(RejectReason::NoImage)
        );
        assert!(!vision.is_analyzing());
        assert_eq!(vision.analysis(), "");
        assert!(backend.calls().is_empty());
        assert_eq!(vision.prompt(), DEFAULT_VISION_PROMPT);
    }

    #[test]
    fn analyze_sends_image_and_prompt() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shot.png");
        write_png(&path, 4, 3)?;

        let backend = described();
        let mut vision = VisionSession::new(backend.clone(), EventWriter::disabled("s"), None);
        let preview = vision.select_file(&path)?;
        assert_eq!((preview.width, preview.height), (4, 3));

        vision.set_prompt("Count the pixels.");
        assert!(vision.analyze().is_accepted());
        assert_eq!(
            vision.wait().as_deref(),
            Some("analysis of: Count the pixels.")
        );
        assert_eq!(vision.analysis(), "analysis of: Count the pixels.");
        assert_eq!(
            backend.calls(),
            vec!["vision:image/png:Count the pixels.".to_string()]
        );
        Ok(())
    }

    #[test]
    fn blank_prompt_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shot.png");
        write_png(&path, 2, 2)?;

        let mut vision = VisionSession::new(described(), EventWriter::disabled("s"), None);
        vision.select_file(&path)?;
        vision.set_prompt("   ");
        assert_eq!(
            vision.analyze(),
            SubmitOutcome::Rejected(RejectReason::Empty)
        );
        assert!(!vision.is_analyzing());
        Ok(())
    }

    #[test]
    fn selecting_new_file_clears_previous_result() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("first.png");
        let second = temp.path().join("second.png");
        write_png(&first, 2, 2)?;
        write_png(&second, 5, 1)?;

        let mut vision = VisionSession::new(described(), EventWriter::disabled("s"), None);
        vision.select_file(&first)?;
        vision.analyze();
        vision.wait();
        assert!(!vision.analysis().is_empty());

        vision.select_file(&second)?;
        assert_eq!(vision.analysis(), "");
        assert_eq!(
            vision.selected().map(|preview| preview.file_name()),
            Some("second.png".to_string())
        );
        Ok(())
    }

    #[test]
    fn rejected_selection_keeps_current_state() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let good = temp.path().join("good.png");
        let bad = temp.path().join("bad.txt");
        write_png(&good, 2, 2)?;
        fs::write(&bad, "not an image")?;

        let mut vision = VisionSession::new(described(), EventWriter::disabled("s"), None);
        vision.select_file(&good)?;
        vision.analyze();
        let result = vision.wait().unwrap_or_default();

        assert!(vision.select_file(&bad).is_err());
        assert_eq!(vision.analysis(), result);
        assert_eq!(
            vision.selected().map(|preview| preview.file_name()),
            Some("good.png".to_string())
        );
        Ok(())
    }

    #[test]
    fn second_analysis_while_running_is_a_no_op() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shot.png");
        write_png(&path, 2, 2)?;

        let (backend, release) = ScriptedBackend::gated(|_| Ok("slow result".to_string()));
        let mut vision = VisionSession::new(backend.clone(), EventWriter::disabled("s"), None);
        vision.select_file(&path)?;

        assert!(vision.analyze().is_accepted());
        assert!(vision.is_analyzing());
        assert_eq!(
            vision.analyze(),
            SubmitOutcome::Rejected(RejectReason::Pending)
        );
        assert!(vision.select_file(&path).is_err());

        release.send(())?;
        assert_eq!(vision.wait().as_deref(), Some("slow result"));
        assert_eq!(backend.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn failures_become_generic_error_text() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shot.png");
        write_png(&path, 2, 2)?;

        let mut vision = VisionSession::new(
            ScriptedBackend::new(|_| bail!("upstream exploded")),
            EventWriter::disabled("s"),
            None,
        );
        vision.select_file(&path)?;
        vision.analyze();
        assert_eq!(vision.wait().as_deref(), Some(IMAGE_PROCESSING_ERROR_TEXT));

        // File vanished between selection and analysis.
        fs::remove_file(&path)?;
        let backend = described();
        vision.set_backend(backend.clone());
        vision.analyze();
        assert_eq!(vision.wait().as_deref(), Some(IMAGE_PROCESSING_ERROR_TEXT));
        assert!(backend.calls().is_empty());
        Ok(())
    }

    #[test]
    fn finish_event_names_the_model_that_served_the_analysis() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image_path = temp.path().join("shot.png");
        let log_path = temp.path().join("events.jsonl");
        write_png(&image_path, 2, 2)?;

        let (backend, release) = ScriptedBackend::gated(|_| Ok("slow result".to_string()));
        let mut vision = VisionSession::new(backend, EventWriter::new(&log_path, "s-3"), None);
        vision.select_file(&image_path)?;
        assert!(vision.analyze().is_accepted());
        vision.set_backend(std::sync::Arc::new(DryrunBackend::new("dryrun-text-1")));
        release.send(())?;
        assert_eq!(vision.wait().as_deref(), Some("slow result"));

        let finished = fs::read_to_string(&log_path)?
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .find(|event| event["type"] == "vision_analysis_finished")
            .ok_or_else(|| anyhow::anyhow!("missing finish event"))?;
        assert_eq!(finished["model"], "scripted-1");
        assert_eq!(finished["ok"], true);
        Ok(())
    }
}
