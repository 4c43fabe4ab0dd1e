use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::sse::SseDecoder;
use crate::transcript::Message;

/// Shown in place of the assistant reply when the request is rejected or the
/// stream produces no content.
pub const ERROR_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// Shown when the request or the body read dies on the wire.
pub const NETWORK_ERROR_REPLY: &str =
    "Unable to reach the server. Check your connection and try again.";

/// Events emitted while one exchange streams in. Failures are terminal for
/// the exchange; there are no retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental fragment of assistant text, in decode order.
    Delta(String),
    /// The body drained to its end; `deltas` counts the fragments extracted.
    Done { deltas: usize },
    /// Non-success HTTP status.
    Failed,
    /// The request or a body read errored.
    NetworkError,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tool_ids: &'a [String],
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    tool_ids: Vec<String>,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            tool_ids: config.tool_ids.clone(),
        }
    }

    /// Run one exchange: POST the transcript, then drain the SSE body,
    /// reporting progress over `tx`. `messages` is the transcript at send
    /// time, without the assistant slot still being filled.
    pub async fn stream_chat(&self, messages: Vec<Message>, tx: mpsc::UnboundedSender<StreamEvent>) {
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
            tool_ids: &self.tool_ids,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "chat request failed to send");
                let _ = tx.send(StreamEvent::NetworkError);
                return;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "chat request rejected");
            let _ = tx.send(StreamEvent::Failed);
            return;
        }

        let terminal = drain_body(response.bytes_stream(), &tx).await;
        let _ = tx.send(terminal);
    }
}

/// Drain a streaming response body through the SSE decoder, forwarding each
/// delta in order. Returns the terminal event for the exchange.
async fn drain_body<S, B, E>(mut body: S, tx: &mpsc::UnboundedSender<StreamEvent>) -> StreamEvent
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();
    let mut deltas = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(%err, "chat stream read failed");
                return StreamEvent::NetworkError;
            }
        };
        for delta in decoder.push(chunk.as_ref()) {
            deltas += 1;
            let _ = tx.send(StreamEvent::Delta(delta));
        }
    }

    StreamEvent::Done { deltas }
}
