//! `WsLogSource`: `LogSource` over a Solana JSON-RPC WebSocket
//! `logsSubscribe` subscription.
//!
//! # Usage
//! ```no_run
//! use logcodec_stream::ws_listener::WsLogSource;
//!
//! let source = WsLogSource::new(
//!     "wss://api.devnet.solana.com",
//!     "3YdayPtujByJ1g1DWEUh7vpg78gZL49FWyD5rDGyof9T",
//! ).unwrap();
//! ```

use crate::listener::{Commitment, LogSource, LogStream, RawLogBatch};
use async_trait::async_trait;
use futures::{channel::mpsc, SinkExt, StreamExt};
use logcodec_core::error::StreamError;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

/// WebSocket log source.
///
/// Subscribes to `logsSubscribe({"mentions": [program]})` and emits one
/// `RawLogBatch` per successful transaction. Transactions that failed are
/// skipped: their emitted events were rolled back.
pub struct WsLogSource {
    rpc_url: String,
    program_id: String,
    connected: Arc<AtomicBool>,
}

impl WsLogSource {
    /// `rpc_url` must be a `ws://` or `wss://` URL.
    pub fn new(rpc_url: impl Into<String>, program_id: impl Into<String>) -> Result<Self, StreamError> {
        let rpc_url = rpc_url.into();
        let parsed = url::Url::parse(&rpc_url).map_err(|e| StreamError::InvalidEndpoint {
            url: rpc_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidEndpoint {
                url: rpc_url,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(Self {
            rpc_url,
            program_id: program_id.into(),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl LogSource for WsLogSource {
    fn program_id(&self) -> &str {
        &self.program_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn subscribe(&self, commitment: Commitment) -> Result<LogStream, StreamError> {
        let (tx, rx) = mpsc::channel::<Result<RawLogBatch, StreamError>>(512);

        let rpc_url = self.rpc_url.clone();
        let request = subscribe_request(&self.program_id, commitment);
        let connected = Arc::clone(&self.connected);

        tokio::spawn(async move {
            run_ws_subscription(rpc_url, request, connected, tx).await;
        });

        Ok(Box::pin(rx))
    }
}

// ─── Internal WebSocket loop ──────────────────────────────────────────────────

async fn run_ws_subscription(
    rpc_url: String,
    request: Value,
    connected: Arc<AtomicBool>,
    mut tx: mpsc::Sender<Result<RawLogBatch, StreamError>>,
) {
    info!("Connecting to WebSocket: {}", rpc_url);

    let ws_stream = match connect_async(rpc_url.as_str()).await {
        Ok((ws, _)) => {
            connected.store(true, Ordering::Relaxed);
            info!("WebSocket connected: {}", rpc_url);
            ws
        }
        Err(e) => {
            connected.store(false, Ordering::Relaxed);
            error!("WebSocket connect failed: {}", e);
            let _ = tx
                .send(Err(StreamError::ConnectionFailed {
                    url: rpc_url.clone(),
                    reason: e.to_string(),
                }))
                .await;
            let _ = tx.send(Err(StreamError::Closed)).await;
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    if let Err(e) = write.send(Message::Text(request.to_string())).await {
        error!("Failed to send logsSubscribe: {}", e);
        connected.store(false, Ordering::Relaxed);
        let _ = tx.send(Err(StreamError::Closed)).await;
        return;
    }

    while let Some(msg_result) = read.next().await {
        match msg_result {
            Err(e) => {
                warn!("WebSocket error: {}", e);
                let _ = tx.send(Err(StreamError::Closed)).await;
                break;
            }
            Ok(Message::Text(text)) => {
                trace!("WS message: {}", preview(&text, 120));
                if let Some(batch) = parse_logs_notification(&text) {
                    if tx.send(Ok(batch)).await.is_err() {
                        // Receiver dropped
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed by server");
                let _ = tx.send(Err(StreamError::Closed)).await;
                break;
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(_) => {}
        }
    }

    connected.store(false, Ordering::Relaxed);
    info!("WebSocket subscription loop ended");
}

/// At most the first `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}

// ─── Message building / parsing ──────────────────────────────────────────────

fn subscribe_request(program_id: &str, commitment: Commitment) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [program_id] },
            { "commitment": commitment.as_str() }
        ]
    })
}

/// Parse a `logsNotification` message into a `RawLogBatch`.
/// Returns `None` for subscription confirmations, failed transactions, or
/// anything unparseable.
fn parse_logs_notification(text: &str) -> Option<RawLogBatch> {
    let v: Value = serde_json::from_str(text).ok()?;

    if v.get("method")?.as_str()? != "logsNotification" {
        return None;
    }

    let result = v.get("params")?.get("result")?;
    let slot = result
        .get("context")
        .and_then(|c| c.get("slot"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let value = result.get("value")?;
    let signature = value.get("signature")?.as_str()?.to_string();

    if value.get("err").map(|e| !e.is_null()).unwrap_or(false) {
        debug!(%signature, "skipping failed transaction");
        return None;
    }

    let logs = value
        .get("logs")?
        .as_array()?
        .iter()
        .filter_map(|l| l.as_str().map(String::from))
        .collect();

    Some(RawLogBatch {
        signature,
        slot,
        logs,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_stops_on_char_boundary() {
        let text = format!("{}é tail", "a".repeat(119));
        assert_eq!(preview(&text, 120), format!("{}é", "a".repeat(119)));
        assert_eq!(preview("short", 120), "short");
        assert_eq!(preview("ééé", 2), "éé");
    }

    #[test]
    fn parse_notification() {
        let msg = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 5208469 },
                    "value": {
                        "signature": "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv",
                        "err": null,
                        "logs": [
                            "Program 3YdayPtujByJ1g1DWEUh7vpg78gZL49FWyD5rDGyof9T invoke [1]",
                            "Program data: AAAAAAAAAAAqAAAAAAAAAA=="
                        ]
                    }
                },
                "subscription": 24040
            }
        }"#;
        let batch = parse_logs_notification(msg).unwrap();
        assert_eq!(batch.slot, 5208469);
        assert_eq!(batch.logs.len(), 2);
        assert!(batch.signature.starts_with("5h6x"));
    }

    #[test]
    fn skip_subscription_confirmation() {
        let msg = r#"{"jsonrpc":"2.0","result":24040,"id":1}"#;
        assert!(parse_logs_notification(msg).is_none());
    }

    #[test]
    fn skip_failed_transaction() {
        let msg = r#"{
            "jsonrpc": "2.0", "method": "logsNotification",
            "params": { "result": {
                "context": { "slot": 1 },
                "value": { "signature": "abc", "err": { "InstructionError": [0, "Custom"] }, "logs": [] }
            }, "subscription": 1 }
        }"#;
        assert!(parse_logs_notification(msg).is_none());
    }

    #[test]
    fn request_names_program_and_commitment() {
        let req = subscribe_request("Prog1111", Commitment::Finalized);
        assert_eq!(req["method"], "logsSubscribe");
        assert_eq!(req["params"][0]["mentions"][0], "Prog1111");
        assert_eq!(req["params"][1]["commitment"], "finalized");
    }

    #[test]
    fn rejects_non_ws_url() {
        assert!(matches!(
            WsLogSource::new("https://api.devnet.solana.com", "Prog"),
            Err(StreamError::InvalidEndpoint { .. })
        ));
        assert!(WsLogSource::new("not a url", "Prog").is_err());
        let source = WsLogSource::new("ws://127.0.0.1:8900", "Prog").unwrap();
        assert!(!source.is_connected());
        assert_eq!(source.program_id(), "Prog");
    }
}
