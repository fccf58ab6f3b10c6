//! Per-connection SSE lifecycle: chunk emission, heartbeats, timeouts,
//! disconnect detection, and process-wide shutdown of live streams.
//!
//! Each streaming request runs as one task pushing [`Event`]s through a
//! capacity-1 channel; the HTTP response drains it. A slow client therefore
//! throttles event parsing, which throttles the subprocess through its
//! stdout pipe. When the client disconnects, the receiver drops, the next
//! send fails, and dropping the event stream kills the subprocess — the
//! partial assistant turn is never persisted.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use claude_client::{ClaudeEvent, EndReason, FailureKind};
use gateway_core::openai::CompletionChunk;
use gateway_core::{GatewayError, HeaderOverrides, ValidatedRequest};

use crate::service::{
    assistant_message, map_client_error, map_failure, session_messages, CompletionMeta,
    ToolCallAccumulator,
};
use crate::state::AppState;
use crate::translate;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Tracks live streams and fans a shutdown signal out to all of them.
pub struct StreamRegistry {
    shutdown_tx: watch::Sender<bool>,
    live: Mutex<HashSet<String>>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        StreamRegistry {
            shutdown_tx,
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Tell every live stream to terminate cleanly (error event + `[DONE]`).
    pub fn shutdown_all(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().expect("stream registry lock").len()
    }

    fn register(&self, id: &str) {
        self.live
            .lock()
            .expect("stream registry lock")
            .insert(id.to_string());
    }

    fn unregister(&self, id: &str) {
        self.live.lock().expect("stream registry lock").remove(id);
    }
}

/// Registry membership tied to the stream task's lifetime.
struct StreamGuard {
    registry: Arc<StreamRegistry>,
    id: String,
}

impl StreamGuard {
    fn new(registry: Arc<StreamRegistry>, id: String) -> Self {
        registry.register(&id);
        StreamGuard { registry, id }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Start the stream task and hand its channel to the SSE response.
pub fn begin(
    state: &AppState,
    validated: ValidatedRequest,
    overrides: HeaderOverrides,
) -> impl IntoResponse {
    let meta = CompletionMeta::generate();
    let (tx, rx) = mpsc::channel::<Event>(1);
    let guard = StreamGuard::new(state.streams.clone(), meta.id.clone());
    let heartbeat = state.config.heartbeat_interval;

    tokio::spawn(run_stream(state.clone(), validated, overrides, meta, tx, guard));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store"),
    );
    // Disable proxy buffering so chunks reach the client as they are made.
    headers.insert(
        header::HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    (
        headers,
        Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat")),
    )
}

// ---------------------------------------------------------------------------
// Stream task
// ---------------------------------------------------------------------------

enum Outcome {
    Finished(EndReason),
    TimedOut,
    Failed(GatewayError),
    Shutdown,
    /// Producer closed without a terminal event.
    Vanished,
}

async fn run_stream(
    state: AppState,
    validated: ValidatedRequest,
    overrides: HeaderOverrides,
    meta: CompletionMeta,
    tx: mpsc::Sender<Event>,
    guard: StreamGuard,
) {
    let _guard = guard;
    let request = &validated.request;
    let model = request.model.clone();

    let history = match &request.session_id {
        Some(sid) => state.sessions.get_or_create(sid).await,
        None => Vec::new(),
    };

    let invocation = translate::build_invocation(
        &validated,
        &overrides,
        &history,
        state.auth.env_overrides(),
        state.config.max_timeout_ms,
    );

    tracing::info!(
        completion_id = %meta.id,
        model = %model,
        session_id = request.session_id.as_deref().unwrap_or("-"),
        "chat completion stream"
    );

    let mut events = state.backend.invoke(invocation.prompt, invocation.options);
    let mut shutdown = state.streams.subscribe();

    if !send_chunk(&tx, &CompletionChunk::role(&meta.id, &model, meta.created)).await {
        return;
    }

    // Connection deadline; the subprocess carries the same budget, so this
    // only fires when the producer itself stalls.
    let deadline = tokio::time::sleep(Duration::from_millis(state.config.max_timeout_ms));
    tokio::pin!(deadline);

    let mut content = String::new();
    let mut acc = ToolCallAccumulator::new();
    let mut content_sent = false;

    let outcome = loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break Outcome::Shutdown,
            () = &mut deadline => break Outcome::TimedOut,
            event = events.next() => match event {
                None => break Outcome::Vanished,
                Some(Err(e)) => break Outcome::Failed(map_client_error(e)),
                Some(Ok(ClaudeEvent::TextDelta { text })) => {
                    content.push_str(&text);
                    content_sent = true;
                    if !send_chunk(&tx, &CompletionChunk::content(&meta.id, &model, meta.created, text)).await {
                        return;
                    }
                }
                Some(Ok(ClaudeEvent::ToolUse { id, name, partial_arguments })) => {
                    let (index, first) = acc.absorb(&id, name.as_deref(), &partial_arguments);
                    content_sent = true;
                    let chunk = CompletionChunk::tool_call(
                        &meta.id,
                        &model,
                        meta.created,
                        index,
                        first.then_some(id),
                        if first { name } else { None },
                        partial_arguments,
                    );
                    if !send_chunk(&tx, &chunk).await {
                        return;
                    }
                }
                Some(Ok(ClaudeEvent::Thinking { .. })) => {}
                Some(Ok(ClaudeEvent::Usage { .. })) => {}
                Some(Ok(ClaudeEvent::Error { kind: FailureKind::Timeout, .. })) => {
                    break Outcome::TimedOut;
                }
                Some(Ok(ClaudeEvent::Error { kind, message })) => {
                    break Outcome::Failed(map_failure(kind, message));
                }
                Some(Ok(ClaudeEvent::End { reason })) => break Outcome::Finished(reason),
            }
        }
    };

    match outcome {
        Outcome::Finished(reason) => {
            persist_turn(&state, &validated, content, acc).await;
            if !send_chunk(&tx, &CompletionChunk::finish(&meta.id, &model, meta.created, reason.as_str())).await {
                return;
            }
        }
        Outcome::TimedOut => {
            if content_sent {
                // The truncated turn was delivered as a completion, so the
                // transcript keeps it.
                persist_turn(&state, &validated, content, acc).await;
                if !send_chunk(&tx, &CompletionChunk::finish(&meta.id, &model, meta.created, "length")).await {
                    return;
                }
            } else {
                let err = GatewayError::Timeout(format!(
                    "no output within {}ms",
                    state.config.max_timeout_ms
                ));
                if !send_error(&tx, &err).await {
                    return;
                }
            }
        }
        Outcome::Failed(err) => {
            tracing::warn!(completion_id = %meta.id, error = %err, "stream failed");
            if !send_error(&tx, &err).await {
                return;
            }
        }
        Outcome::Shutdown => {
            let err = GatewayError::Internal("server shutting down".to_string());
            if !send_error(&tx, &err).await {
                return;
            }
        }
        Outcome::Vanished => {
            let err = GatewayError::Internal("event stream ended without a result".to_string());
            if !send_error(&tx, &err).await {
                return;
            }
        }
    }

    let _ = tx.send(Event::default().data("[DONE]")).await;
}

async fn persist_turn(
    state: &AppState,
    validated: &ValidatedRequest,
    content: String,
    acc: ToolCallAccumulator,
) {
    let Some(sid) = &validated.request.session_id else {
        return;
    };
    let assistant = assistant_message(content, acc.into_tool_calls());
    let appended = session_messages(&validated.request.messages, assistant);
    if let Err(e) = state.sessions.append(sid, appended).await {
        tracing::warn!(session_id = %sid, error = %e, "session append skipped");
    }
}

async fn send_chunk(tx: &mpsc::Sender<Event>, chunk: &CompletionChunk) -> bool {
    match serde_json::to_string(chunk) {
        Ok(json) => tx.send(Event::default().data(json)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "chunk serialization failed");
            false
        }
    }
}

/// In-stream error payload, per the post-header error contract.
async fn send_error(tx: &mpsc::Sender<Event>, err: &GatewayError) -> bool {
    tx.send(Event::default().data(err.body().to_string()))
        .await
        .is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_counts_and_clears_guards() {
        let registry = Arc::new(StreamRegistry::new());
        let g1 = StreamGuard::new(registry.clone(), "a".into());
        let _g2 = StreamGuard::new(registry.clone(), "b".into());
        assert_eq!(registry.live_count(), 2);
        drop(g1);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_signal_reaches_subscribers() {
        let registry = StreamRegistry::new();
        let mut rx = registry.subscribe();
        assert!(!*rx.borrow());
        registry.shutdown_all();
        rx.wait_for(|stop| *stop).await.unwrap();
    }
}
