//! Socket subscription surface.
//!
//! One bidirectional channel of JSON-framed events. The hub pushes a
//! single `state` snapshot on connect, then relays every ingress event;
//! clients may push `token:analyze` to repoint the analysis loop.

use crate::hub::HubContext;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Minimum plausible token-address length accepted from clients.
const MIN_ADDRESS_LEN: usize = 10;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<HubContext>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: HubContext) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = ctx.state.subscribe();
    info!("subscriber connected");

    // One-shot state snapshot before the event stream starts.
    let snapshot = json!({
        "event": "state",
        "data": ctx.state.connect_snapshot().await,
    });
    if let Ok(text) = serde_json::to_string(&snapshot) {
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    // Per-client error lane: protocol errors go only to the offender.
    let (err_tx, mut err_rx) = tokio::sync::mpsc::channel::<String>(8);

    // Forward broadcast events. A lagged receiver drops the missed
    // messages and keeps going; slow consumers never stall ingress.
    let send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                event = rx.recv() => match event {
                    Ok(envelope) => serde_json::to_string(&envelope).ok(),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "subscriber lagged, messages dropped");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                error = err_rx.recv() => match error {
                    Some(message) => {
                        serde_json::to_string(&json!({"event": "error", "data": message})).ok()
                    }
                    None => break,
                },
            };
            let Some(text) = outgoing else {
                warn!("failed to serialize event");
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound: client commands.
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                if let Some(address) = parse_analyze_request(&text) {
                    info!(token = %address, "client requested analysis");
                    ctx.analysis.clone().start_loop(&address).await;
                } else if text.contains("token:analyze") {
                    // Recognized event, unusable payload.
                    let _ = err_tx.send("invalid token address".to_string()).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    info!("subscriber disconnected");
}

/// Accept `{"event":"token:analyze","data":{"tokenAddress":"0x.."}}`,
/// `{"event":"token:analyze","data":"0x.."}` and a few lenient shapes.
fn parse_analyze_request(text: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    if parsed["event"].as_str()? != "token:analyze" {
        return None;
    }
    let data = &parsed["data"];
    let address = data
        .as_str()
        .or_else(|| data["tokenAddress"].as_str())?
        .trim()
        .to_string();
    if address.len() >= MIN_ADDRESS_LEN {
        Some(address)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_payload() {
        let text = r#"{"event":"token:analyze","data":{"tokenAddress":"0x1234567890abcdef"}}"#;
        assert_eq!(
            parse_analyze_request(text).as_deref(),
            Some("0x1234567890abcdef")
        );
    }

    #[test]
    fn test_parse_string_payload() {
        let text = r#"{"event":"token:analyze","data":"0x1234567890abcdef"}"#;
        assert_eq!(
            parse_analyze_request(text).as_deref(),
            Some("0x1234567890abcdef")
        );
    }

    #[test]
    fn test_reject_short_address() {
        let text = r#"{"event":"token:analyze","data":"0x123"}"#;
        assert!(parse_analyze_request(text).is_none());
    }

    #[test]
    fn test_reject_other_events() {
        assert!(parse_analyze_request(r#"{"event":"ping"}"#).is_none());
        assert!(parse_analyze_request("not json").is_none());
        assert!(parse_analyze_request(r#"{"event":"token:analyze"}"#).is_none());
    }
}
