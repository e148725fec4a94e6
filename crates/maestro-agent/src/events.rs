//! Unified CLI event vocabulary.

use serde::{Deserialize, Serialize};

/// One structured event observed on the assistant CLI's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CliEvent {
    /// A chunk of assistant text.
    Text {
        /// The text delta.
        text: String,
    },
    /// The assistant invoked a tool.
    ToolCall {
        /// Tool name.
        name: String,
        /// Arguments as reported.
        arguments: serde_json::Value,
    },
    /// A tool returned a result.
    ToolResult {
        /// Tool name.
        name: String,
        /// Result payload.
        payload: serde_json::Value,
    },
    /// Token/cost usage report.
    Usage {
        /// Input tokens.
        input_tokens: u64,
        /// Output tokens.
        output_tokens: u64,
        /// Cache-creation tokens.
        cache_creation_tokens: u64,
        /// Cache-read tokens.
        cache_read_tokens: u64,
        /// Reported cost in USD.
        cost_usd: f64,
    },
    /// An error reported by the CLI.
    Error {
        /// Error message.
        message: String,
    },
    /// A note originated by the control plane itself (parse warnings,
    /// drop notices), never by the CLI.
    SystemNote {
        /// The note.
        message: String,
    },
}

impl CliEvent {
    /// Total tokens carried by a usage event (zero otherwise).
    #[must_use]
    pub fn token_total(&self) -> u64 {
        match self {
            Self::Usage {
                input_tokens,
                output_tokens,
                cache_creation_tokens,
                cache_read_tokens,
                ..
            } => input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_token_total_sums_all_buckets() {
        let usage = CliEvent::Usage {
            input_tokens: 10,
            output_tokens: 20,
            cache_creation_tokens: 5,
            cache_read_tokens: 65,
            cost_usd: 0.01,
        };
        assert_eq!(usage.token_total(), 100);
    }

    #[test]
    fn non_usage_token_total_is_zero() {
        assert_eq!(CliEvent::Text { text: "x".into() }.token_total(), 0);
    }

    #[test]
    fn serde_tagged() {
        let event = CliEvent::ToolCall {
            name: "bash".into(),
            arguments: serde_json::json!({"command": "ls"}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(json["name"], "bash");
    }
}
