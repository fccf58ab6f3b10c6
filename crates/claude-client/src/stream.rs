use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::resolver::ClaudeResolver;
use crate::types::{ClaudeEvent, FailureKind, InvokeOptions};
use crate::wire::EventMapper;
use crate::Result;

// ─── EventStream ──────────────────────────────────────────────────────────

/// An async stream of [`ClaudeEvent`]s from one Claude CLI invocation.
///
/// Backed by a capacity-1 mpsc channel: the producer task parses at most one
/// event ahead of the consumer, so a slow reader throttles the subprocess
/// through its stdout pipe. Dropping `EventStream` cancels the invocation —
/// the child is sent SIGTERM, then SIGKILL after a 2 s grace.
///
/// Single-consumer, not restartable.
pub struct EventStream {
    rx: mpsc::Receiver<Result<ClaudeEvent>>,
}

impl EventStream {
    pub(crate) fn spawn(resolver: Arc<ClaudeResolver>, prompt: String, opts: InvokeOptions) -> Self {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let resolved = match resolver.resolve().await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let process = match ClaudeProcess::spawn(&resolved.path, &prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    // A vanished binary means the cached path is stale.
                    if e.is_binary_missing() {
                        resolver.invalidate().await;
                    }
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            drive(process, opts.timeout_ms, tx).await;
        });

        EventStream { rx }
    }

    /// Wrap a raw channel as an `EventStream`.
    ///
    /// This is the seam stubbed backends and tests use to inject pre-built
    /// event sequences without spawning a subprocess.
    pub fn from_channel(rx: mpsc::Receiver<Result<ClaudeEvent>>) -> Self {
        EventStream { rx }
    }
}

impl Stream for EventStream {
    type Item = Result<ClaudeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Producer loop ────────────────────────────────────────────────────────

/// Drive a spawned process to completion, forwarding normalized events.
///
/// Terminates on: a terminal event (`End`/`Error`), EOF, the deadline,
/// a parse error, or the consumer dropping the receiver. Every exit path
/// reaps the child.
async fn drive(
    mut process: ClaudeProcess,
    timeout_ms: u64,
    tx: mpsc::Sender<Result<ClaudeEvent>>,
) {
    let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
    tokio::pin!(deadline);

    let mut mapper = EventMapper::new();
    let mut saw_terminal = false;

    'read: loop {
        tokio::select! {
            // Consumer dropped the stream — caller cancellation.
            () = tx.closed() => {
                process.shutdown().await;
                return;
            }
            () = &mut deadline => {
                process.shutdown().await;
                let _ = tx
                    .send(Ok(ClaudeEvent::Error {
                        kind: FailureKind::Timeout,
                        message: format!("claude invocation exceeded {timeout_ms}ms"),
                    }))
                    .await;
                return;
            }
            msg = process.next_message() => match msg {
                Err(e) => {
                    // Undecodable stdout or byte cap: kill and surface.
                    process.shutdown().await;
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                Ok(None) => break 'read,
                Ok(Some(raw)) => {
                    for event in mapper.map(raw) {
                        let terminal = matches!(
                            event,
                            ClaudeEvent::End { .. } | ClaudeEvent::Error { .. }
                        );
                        if tx.send(Ok(event)).await.is_err() {
                            process.shutdown().await;
                            return;
                        }
                        if terminal {
                            saw_terminal = true;
                        }
                    }
                    if saw_terminal {
                        break 'read;
                    }
                }
            }
        }
    }

    if saw_terminal {
        // Terminal event delivered; the child exits on its own right after
        // the result line — shutdown only reaps it.
        process.shutdown().await;
        return;
    }

    // EOF without a terminal event: classify by exit status.
    match process.wait().await {
        Ok(status) if status.success() => {
            let _ = tx
                .send(Ok(ClaudeEvent::Error {
                    kind: FailureKind::ParseError,
                    message: "stream ended without a result message".into(),
                }))
                .await;
        }
        Ok(status) => {
            let tail = process.stderr_tail().await;
            let message = if tail.is_empty() {
                format!("claude exited with {status}")
            } else {
                tail
            };
            let _ = tx
                .send(Ok(ClaudeEvent::Error {
                    kind: FailureKind::SubprocessFailure,
                    message,
                }))
                .await;
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
