//! Line-aware structured-event parser for the assistant CLI's output.
//!
//! The parser detects its mode from the first complete line: a JSON object
//! carrying a `type` field locks **JSON mode**; anything else locks **plain
//! mode**, where ANSI escapes are stripped and the CLI's tool-use sentinels
//! are recognized. In JSON mode a malformed line becomes a
//! [`CliEvent::SystemNote`] and parsing continues.

use std::sync::LazyLock;

use regex::Regex;

use crate::events::CliEvent;

/// CSI escape sequences (colors, cursor movement).
static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());

/// Plain-mode tool-use sentinels, in match order.
const SENTINEL_RUNNING: &str = "💻 Running command ";
const SENTINEL_READING: &str = "📖 Reading ";
const SENTINEL_EDITED: &str = "✏️ Edited ";

/// Strip ANSI CSI escape sequences from a line.
#[must_use]
pub fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").into_owned()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Detecting,
    Json,
    Plain,
}

/// Stateful line-buffered parser over CLI output chunks.
#[derive(Debug)]
pub struct EventParser {
    mode: Mode,
    buffer: String,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    /// Create a parser in mode-detection state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Mode::Detecting,
            buffer: String::new(),
        }
    }

    /// Feed a raw output chunk; returns the events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<CliEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any trailing partial line at end of stream.
    pub fn flush(&mut self) -> Option<CliEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(line.trim_end_matches(['\n', '\r']))
    }

    /// Parse one complete line according to the current mode.
    pub fn parse_line(&mut self, line: &str) -> Option<CliEvent> {
        if line.trim().is_empty() {
            return None;
        }

        if self.mode == Mode::Detecting {
            self.mode = if looks_like_json_event(line) {
                Mode::Json
            } else {
                Mode::Plain
            };
        }

        match self.mode {
            Mode::Json => Some(parse_json_line(line)),
            Mode::Plain => Some(parse_plain_line(line)),
            Mode::Detecting => unreachable!("mode locked above"),
        }
    }
}

fn looks_like_json_event(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('{')
        && serde_json::from_str::<serde_json::Value>(trimmed)
            .is_ok_and(|v| v.get("type").is_some())
}

fn parse_json_line(line: &str) -> CliEvent {
    let value: serde_json::Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(e) => {
            return CliEvent::SystemNote {
                message: format!("unparseable event line: {e}"),
            };
        }
    };

    let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
    match event_type {
        "text" => CliEvent::Text {
            text: value
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_owned(),
        },
        "tool_use" => CliEvent::ToolCall {
            name: value
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_owned(),
            arguments: value.get("input").cloned().unwrap_or(serde_json::Value::Null),
        },
        "tool_result" => CliEvent::ToolResult {
            name: value
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_owned(),
            payload: value
                .get("content")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        },
        "usage" => CliEvent::Usage {
            input_tokens: value.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: value
                .get("output_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cache_creation_tokens: value
                .get("cache_creation_input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cache_read_tokens: value
                .get("cache_read_input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cost_usd: value.get("cost_usd").and_then(|v| v.as_f64()).unwrap_or(0.0),
        },
        "error" => CliEvent::Error {
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_owned(),
        },
        other => CliEvent::SystemNote {
            message: format!("unrecognized event type: {other}"),
        },
    }
}

fn parse_plain_line(line: &str) -> CliEvent {
    let clean = strip_ansi(line);
    let trimmed = clean.trim_start();

    if let Some(command) = trimmed.strip_prefix(SENTINEL_RUNNING) {
        return CliEvent::ToolCall {
            name: "bash".to_owned(),
            arguments: serde_json::json!({ "command": command.trim() }),
        };
    }
    if let Some(path) = trimmed.strip_prefix(SENTINEL_READING) {
        return CliEvent::ToolCall {
            name: "read".to_owned(),
            arguments: serde_json::json!({ "path": path.trim() }),
        };
    }
    if let Some(path) = trimmed.strip_prefix(SENTINEL_EDITED) {
        return CliEvent::ToolResult {
            name: "edit".to_owned(),
            payload: serde_json::json!({ "path": path.trim() }),
        };
    }

    CliEvent::Text { text: clean }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
