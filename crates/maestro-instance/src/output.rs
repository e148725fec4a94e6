//! Instance output pipeline.
//!
//! Consumes raw PTY chunks, parses them with the shared line-aware event
//! parser, coalesces text at ~100 ms granularity, persists every observed
//! event to `instance_logs`, applies metric deltas to the instance row, and
//! fans events out to subscribers.

use std::time::Duration;

use maestro_agent::events::CliEvent;
use maestro_agent::parser::EventParser;
use maestro_core::text::truncate_with_suffix;
use maestro_store::ConnectionPool;
use maestro_store::repositories::{InstanceLogRepo, InstanceRepo};
use maestro_store::repositories::instance::MetricDeltas;
use maestro_store::row_types::InstanceLogKind;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Coalescing window for text chunks.
const COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// One observed instance event, as delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceEvent {
    /// Owning instance.
    pub instance_id: String,
    /// Event kind.
    pub kind: InstanceLogKind,
    /// Event payload (possibly a truncated preview for large tool results).
    pub payload: serde_json::Value,
    /// Tokens added by this event.
    pub tokens_delta: i64,
    /// Cost added by this event.
    pub cost_delta_usd: f64,
    /// RFC3339 observation time.
    pub timestamp: String,
}

/// Callbacks from the pipeline into the lifecycle layer.
pub(crate) struct PipelineHooks {
    /// The CLI emitted its ready marker.
    pub on_ready_marker: Box<dyn Fn() + Send + Sync>,
    /// The PTY closed.
    pub on_eof: Box<dyn Fn() + Send + Sync>,
    /// A tool call was observed (per-name counting lives with the manager).
    pub on_tool_call: Box<dyn Fn(&str) + Send + Sync>,
}

/// The per-instance output pipeline.
pub(crate) struct OutputPipeline {
    pub instance_id: String,
    pub pool: ConnectionPool,
    pub events_tx: broadcast::Sender<InstanceEvent>,
    pub ready_marker: String,
    pub tool_result_preview_bytes: usize,
    pub hooks: PipelineHooks,
}

impl OutputPipeline {
    /// Drive the pipeline until the PTY closes.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        let mut parser = EventParser::new();
        let mut text_buf = String::new();
        let mut tick = tokio::time::interval(COALESCE_WINDOW);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(bytes) => {
                        let chunk = String::from_utf8_lossy(&bytes).into_owned();
                        for event in parser.feed(&chunk) {
                            self.handle(event, &mut text_buf);
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => self.flush_text(&mut text_buf),
            }
        }

        if let Some(event) = parser.flush() {
            self.handle(event, &mut text_buf);
        }
        self.flush_text(&mut text_buf);
        (self.hooks.on_eof)();
    }

    fn handle(&self, event: CliEvent, text_buf: &mut String) {
        match event {
            CliEvent::Text { text } => {
                if text.contains(&self.ready_marker) {
                    (self.hooks.on_ready_marker)();
                }
                if !text_buf.is_empty() {
                    text_buf.push('\n');
                }
                text_buf.push_str(&text);
            }
            CliEvent::ToolCall { name, arguments } => {
                self.flush_text(text_buf);
                (self.hooks.on_tool_call)(&name);
                let payload = serde_json::json!({ "name": name, "arguments": arguments });
                self.record(InstanceLogKind::ToolCall, &payload, 0, 0.0);
                self.apply_metrics(MetricDeltas {
                    tool_calls: 1,
                    ..Default::default()
                });
                self.broadcast(InstanceLogKind::ToolCall, payload, 0, 0.0);
            }
            CliEvent::ToolResult { name, payload } => {
                self.flush_text(text_buf);
                let full = serde_json::json!({ "name": name, "payload": payload });
                self.record(InstanceLogKind::ToolResult, &full, 0, 0.0);

                // Oversized results go out as a preview; the full payload
                // stays in the instance log.
                let rendered = payload.to_string();
                let outgoing = if rendered.len() > self.tool_result_preview_bytes {
                    serde_json::json!({
                        "name": name,
                        "truncated": true,
                        "preview": truncate_with_suffix(
                            &rendered,
                            self.tool_result_preview_bytes,
                            "…",
                        ),
                        "ref": "instance_log",
                    })
                } else {
                    full
                };
                self.broadcast(InstanceLogKind::ToolResult, outgoing, 0, 0.0);
            }
            CliEvent::Usage {
                input_tokens,
                output_tokens,
                cache_creation_tokens,
                cache_read_tokens,
                cost_usd,
            } => {
                self.flush_text(text_buf);
                let tokens =
                    (input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens)
                        as i64;
                let payload = serde_json::json!({
                    "input_tokens": input_tokens,
                    "output_tokens": output_tokens,
                    "cache_creation_tokens": cache_creation_tokens,
                    "cache_read_tokens": cache_read_tokens,
                    "cost_usd": cost_usd,
                });
                self.record(InstanceLogKind::Cost, &payload, tokens, cost_usd);
                self.apply_metrics(MetricDeltas {
                    tokens,
                    cost_usd,
                    ..Default::default()
                });
                self.broadcast(InstanceLogKind::Cost, payload, tokens, cost_usd);
            }
            CliEvent::Error { message } => {
                self.flush_text(text_buf);
                let payload = serde_json::json!({ "message": message });
                self.record(InstanceLogKind::Error, &payload, 0, 0.0);
                self.broadcast(InstanceLogKind::Error, payload, 0, 0.0);
            }
            CliEvent::SystemNote { message } => {
                let payload = serde_json::json!({ "message": message });
                self.record(InstanceLogKind::System, &payload, 0, 0.0);
                self.broadcast(InstanceLogKind::System, payload, 0, 0.0);
            }
        }
    }

    fn flush_text(&self, text_buf: &mut String) {
        if text_buf.is_empty() {
            return;
        }
        let text = std::mem::take(text_buf);
        let payload = serde_json::json!({ "text": text });
        self.record(InstanceLogKind::Stdout, &payload, 0, 0.0);
        self.broadcast(InstanceLogKind::Stdout, payload, 0, 0.0);
    }

    fn record(
        &self,
        kind: InstanceLogKind,
        payload: &serde_json::Value,
        tokens_delta: i64,
        cost_delta_usd: f64,
    ) {
        let persisted = self.pool.get().map_err(|e| e.to_string()).and_then(|conn| {
            InstanceLogRepo::append(
                &conn,
                &self.instance_id,
                kind,
                Some(&payload.to_string()),
                tokens_delta,
                cost_delta_usd,
            )
            .map_err(|e| e.to_string())
        });
        if let Err(e) = persisted {
            warn!(instance_id = %self.instance_id, error = %e, "instance log append failed");
        }
    }

    fn apply_metrics(&self, deltas: MetricDeltas) {
        let applied = self.pool.get().map_err(|e| e.to_string()).and_then(|conn| {
            InstanceRepo::apply_metrics(&conn, &self.instance_id, &deltas).map_err(|e| e.to_string())
        });
        if let Err(e) = applied {
            warn!(instance_id = %self.instance_id, error = %e, "metrics apply failed");
        }
    }

    fn broadcast(
        &self,
        kind: InstanceLogKind,
        payload: serde_json::Value,
        tokens_delta: i64,
        cost_delta_usd: f64,
    ) {
        let _ = self.events_tx.send(InstanceEvent {
            instance_id: self.instance_id.clone(),
            kind,
            payload,
            tokens_delta,
            cost_delta_usd,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
