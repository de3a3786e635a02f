use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{lookup, ArgShape};

/// One parsed line of REPL input.
///
/// `action` is `noop` for blank lines, `submit` for plain text (routed to the
/// active mode), `unknown` for unrecognised slash commands, or one of the
/// actions in the command registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn with_action(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.command_args
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// `/name rest` -> (`name` lowercased, `rest` trimmed). `None` for plain text
/// and for a slash not followed by a command word.
fn split_command(line: &str) -> Option<(String, &str)> {
    let tail = line.strip_prefix('/')?;
    let name_end = tail
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(tail.len());
    if name_end == 0 {
        return None;
    }
    Some((tail[..name_end].to_ascii_lowercase(), tail[name_end..].trim()))
}

/// Quoted paths keep their spaces; unbalanced quotes fall back to
/// whitespace splitting.
fn single_path(arg: &str) -> String {
    let words = shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect());
    words
        .into_iter()
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let line = text.trim();
    if line.is_empty() {
        return Intent::with_action("noop", text);
    }

    let Some((command, arg)) = split_command(line) else {
        let mut intent = Intent::with_action("submit", text);
        intent.prompt = Some(line.to_string());
        return intent;
    };

    let Some(spec) = lookup(&command) else {
        return Intent::with_action("unknown", text)
            .arg("command", command)
            .arg("arg", arg);
    };

    let intent = Intent::with_action(spec.action, text);
    match spec.shape {
        ArgShape::Bare => intent,
        ArgShape::Path(key) => intent.arg(key, single_path(arg)),
        ArgShape::Text(key) => intent.arg(key, arg),
        ArgShape::Fixed(key, value) => intent.arg(key, value),
    }
}
