//! Newline-delimited JSON streaming bodies over broadcast channels.
//!
//! A subscriber that falls behind the channel capacity loses oldest events;
//! the stream tells it once with an `events_dropped` line and resumes.

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use maestro_core::ExecutionEvent;
use maestro_instance::InstanceEvent;
use tokio::sync::broadcast;

const NDJSON: &str = "application/x-ndjson";

fn json_line<T: serde::Serialize>(value: &T) -> Bytes {
    let mut line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_owned());
    line.push('\n');
    Bytes::from(line)
}

fn dropped_line(count: u64) -> Bytes {
    json_line(&serde_json::json!({ "type": "events_dropped", "count": count }))
}

/// Stream execution events until the terminal event.
#[must_use]
pub fn execution_stream(mut rx: broadcast::Receiver<ExecutionEvent>) -> Response {
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield Ok::<_, std::convert::Infallible>(json_line(&event));
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    yield Ok(dropped_line(count));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    ndjson_response(Body::from_stream(stream))
}

/// Stream instance events until the instance's channel closes.
#[must_use]
pub fn instance_stream(mut rx: broadcast::Receiver<InstanceEvent>) -> Response {
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok::<_, std::convert::Infallible>(json_line(&event)),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    yield Ok(dropped_line(count));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    ndjson_response(Body::from_stream(stream))
}

fn ndjson_response(body: Body) -> Response {
    Response::builder()
        .header(CONTENT_TYPE, NDJSON)
        .body(body)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_line_is_newline_terminated() {
        let line = json_line(&serde_json::json!({"a": 1}));
        assert!(line.ends_with(b"\n"));
    }

    #[test]
    fn dropped_line_carries_count() {
        let line = dropped_line(7);
        let text = String::from_utf8(line.to_vec()).unwrap();
        assert!(text.contains("events_dropped"));
        assert!(text.contains('7'));
    }
}
