//! Event source abstraction and the HTTP/SSE implementation.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::time::Duration;

use super::error::StreamError;
use super::event::TelemetryEvent;

/// A live stream of parsed telemetry events.
pub type EventStream = BoxStream<'static, Result<TelemetryEvent, StreamError>>;

/// Something a [`super::StreamClient`] can open a telemetry feed from.
///
/// The production implementation is [`HttpEventSource`]; tests substitute
/// scripted sources to drive the reconnect state machine.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Open a fresh connection. Must be callable again after any close.
    async fn open(&self) -> Result<EventStream, StreamError>;
}

/// Server-Sent-Events source reading `{base}/api/telemetry/stream`.
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSource {
    /// Build a source for the given backend base URL.
    ///
    /// The underlying client gets a connect timeout but no overall request
    /// deadline: the stream is long-lived by design.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        let base = base_url.into();
        Self {
            url: format!("{}/api/telemetry/stream", base.trim_end_matches('/')),
            client,
        }
    }

    /// Stream endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self) -> Result<EventStream, StreamError> {
        let response = self
            .client
            .get(&self.url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Upstream {
                status: status.as_u16(),
            });
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(end) = buffer.find("\n\n") {
                            let frame: String = buffer.drain(..end + 2).collect();
                            if let Some(event) = parse_sse_frame(&frame) {
                                yield Ok(event);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(StreamError::Transport(e.to_string()));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Parse one SSE frame (the text between blank lines) into an event.
///
/// Only `data:` lines carry payload; comment and field lines are skipped.
/// Malformed JSON is logged and dropped - it must never tear down the
/// connection or count as a transport failure.
pub fn parse_sse_frame(frame: &str) -> Option<TelemetryEvent> {
    let data: String = frame
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            line.strip_prefix("data:").map(|rest| rest.trim_start())
        })
        .collect::<Vec<_>>()
        .join("\n");

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<TelemetryEvent>(&data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, payload = %truncate(&data, 256), "Dropping malformed telemetry frame");
            None
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
