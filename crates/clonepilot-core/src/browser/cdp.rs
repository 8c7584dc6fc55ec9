//! CdpConnection — Chrome DevTools Protocol over a websocket.
//!
//! Requests carry an id from an atomic counter and park a `oneshot` sender in
//! the pending map. A background reader resolves them as responses arrive;
//! protocol events (messages without an id) are only traced. When the socket
//! goes away every pending request is failed with [`UiError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::error::UiError;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, UiError>>>>>;

/// Default per-command timeout.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CdpConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a browser-level DevTools websocket URL.
    pub async fn connect(ws_url: &str) -> Result<Self, UiError> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| UiError::Launch(format!("DevTools connect to {}: {}", ws_url, e)))?;
        let (mut sink, mut stream) = socket.split();

        let alive = Arc::new(AtomicBool::new(true));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        let writer_alive = alive.clone();
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!("[cdp] write failed: {}", e);
                    writer_alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_alive = alive.clone();
        let reader_pending = pending.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("[cdp] read failed: {}", e);
                        break;
                    }
                };

                let msg: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!("[cdp] non-JSON frame ({}): {}", e, truncate(&text, 200));
                        continue;
                    }
                };

                match msg.get("id").and_then(Value::as_u64) {
                    Some(id) => {
                        let Some(tx) = reader_pending.lock().await.remove(&id) else {
                            continue;
                        };
                        let _ = tx.send(parse_response(msg));
                    }
                    None => {
                        if let Some(method) = msg.get("method").and_then(Value::as_str) {
                            tracing::trace!("[cdp] event {}", method);
                        }
                    }
                }
            }

            reader_alive.store(false, Ordering::SeqCst);
            for (_, tx) in reader_pending.lock().await.drain() {
                let _ = tx.send(Err(UiError::Closed));
            }
        });

        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a browser-level command.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, UiError> {
        self.send(None, method, params, COMMAND_TIMEOUT).await
    }

    /// Send a command, optionally routed to an attached target session.
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, UiError> {
        if !self.is_alive() {
            return Err(UiError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut msg = serde_json::json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(sid) = session_id {
            msg["sessionId"] = Value::String(sid.to_string());
        }

        if self.outgoing.send(Message::Text(msg.to_string())).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(UiError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UiError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(UiError::timeout(format!("{} (id={})", method, id), timeout))
            }
        }
    }
}

fn parse_response(msg: Value) -> Result<Value, UiError> {
    if let Some(error) = msg.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(UiError::Protocol(format!("[{}] {}", code, message)));
    }
    Ok(msg.get("result").cloned().unwrap_or(Value::Null))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
