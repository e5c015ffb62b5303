//! Stdio JSON-RPC server exposing the dispatcher as MCP tools.
//!
//! Messages are newline-delimited JSON. Every `tools/call` runs on its own
//! task so that `notifications/cancelled` can reach it mid-run; all output
//! funnels through a single writer task.

pub mod protocol;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vr_core::{ProgressEvent, ProgressSender};

use crate::dispatcher::{tool_definitions, ToolDispatcher};
use protocol::{CallParams, CancelledParams, Incoming};

type Outbox = mpsc::UnboundedSender<Value>;

/// Serves one client connection.
pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
    inflight: Arc<DashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            dispatcher,
            inflight: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of tool calls currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Read requests from `reader` until EOF, writing replies to `writer`.
    ///
    /// Lines that are not UTF-8 or not JSON get a parse error and reading
    /// goes on. At EOF, or when reading fails, every running call is
    /// cancelled and awaited, and pending output is flushed before returning.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_messages(writer, rx));
        let mut calls = JoinSet::new();
        let mut buf = Vec::new();
        let mut read_error = None;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Failed to read input: {e}");
                    read_error = Some(e);
                    break;
                }
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::warn!("Rejected non-UTF-8 input: {e}");
                    send(
                        &tx,
                        protocol::error_response(
                            &Value::Null,
                            protocol::PARSE_ERROR,
                            &format!("Parse error: {e}"),
                        ),
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match Incoming::parse(line) {
                Ok(msg) => self.handle(msg, &tx, &mut calls),
                Err((code, message)) => {
                    tracing::warn!("Rejected message: {message}");
                    send(&tx, protocol::error_response(&Value::Null, code, &message));
                }
            }

            while let Some(joined) = calls.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!("Tool call task failed: {e}");
                }
            }
        }

        tracing::info!("Input closed; cancelling {} running call(s)", self.in_flight());
        self.shutdown.cancel();
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Tool call task failed: {e}");
            }
        }

        drop(tx);
        writer_task.await??;
        match read_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn handle(&self, msg: Incoming, tx: &Outbox, calls: &mut JoinSet<()>) {
        let method = msg.method.clone();
        tracing::debug!("Received {method}");
        let id = msg.id.clone().unwrap_or(Value::Null);

        match method.as_str() {
            "initialize" => send(tx, protocol::response(&id, protocol::initialize_result())),
            "notifications/initialized" => {}
            "ping" => send(tx, protocol::response(&id, json!({}))),
            "tools/list" => send(
                tx,
                protocol::response(&id, json!({ "tools": tool_definitions() })),
            ),
            "tools/call" => self.start_call(msg, tx, calls),
            "notifications/cancelled" => self.cancel_call(&msg.params),
            other => {
                if msg.is_notification() {
                    tracing::debug!("Ignoring notification {other}");
                } else {
                    send(
                        tx,
                        protocol::error_response(
                            &id,
                            protocol::METHOD_NOT_FOUND,
                            &format!("Method not found: {other}"),
                        ),
                    );
                }
            }
        }
    }

    fn start_call(&self, msg: Incoming, tx: &Outbox, calls: &mut JoinSet<()>) {
        let Some(id) = msg.id else {
            tracing::warn!("tools/call without an id ignored");
            return;
        };

        let params = CallParams::from_params(&msg.params);
        let progress_token = params.progress_token();
        let Some(request) = params.into_request() else {
            send(
                tx,
                protocol::error_response(&id, protocol::INVALID_PARAMS, "Missing tool name"),
            );
            return;
        };

        let key = protocol::request_key(&id);
        let cancel = self.shutdown.child_token();
        self.inflight.insert(key.clone(), cancel.clone());

        let dispatcher = Arc::clone(&self.dispatcher);
        let inflight = Arc::clone(&self.inflight);
        let tx = tx.clone();
        let progress = progress_sender(tx.clone(), progress_token);

        calls.spawn(async move {
            let outcome = dispatcher.dispatch(&request, &progress, &cancel).await;
            inflight.remove(&key);
            send(&tx, protocol::response(&id, protocol::call_result(&outcome)));
        });
    }

    fn cancel_call(&self, params: &Value) {
        let params: CancelledParams = match serde_json::from_value(params.clone()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Malformed cancellation: {e}");
                return;
            }
        };

        let key = protocol::request_key(&params.request_id);
        match self.inflight.get(&key) {
            Some(token) => {
                tracing::info!(
                    "Cancelling request {key}: {}",
                    params.reason.as_deref().unwrap_or("no reason given")
                );
                token.cancel();
            }
            None => tracing::debug!("Cancellation for unknown request {key}"),
        }
    }
}

/// Progress sink that forwards events and tool output to the client as
/// notifications.
fn progress_sender(tx: Outbox, token: Option<Value>) -> ProgressSender {
    let log_tx = tx.clone();
    let progress = ProgressSender::new(move |event: ProgressEvent| {
        if let Some(ref token) = token {
            send(
                &tx,
                protocol::notification(
                    "notifications/progress",
                    json!({
                        "progressToken": token,
                        "progress": event.percent,
                        "total": 100,
                        "message": event.message,
                    }),
                ),
            );
        }
        if event.error {
            send(
                &tx,
                protocol::notification(
                    "notifications/message",
                    json!({
                        "level": "error",
                        "logger": protocol::SERVER_NAME,
                        "data": event.message,
                    }),
                ),
            );
        }
    });

    progress.with_log(move |line| {
        send(
            &log_tx,
            protocol::notification(
                "notifications/message",
                json!({
                    "level": "info",
                    "logger": protocol::SERVER_NAME,
                    "data": line,
                }),
            ),
        );
    })
}

fn send(tx: &Outbox, message: Value) {
    if tx.send(message).is_err() {
        tracing::debug!("Output closed; dropping message");
    }
}

async fn write_messages<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
