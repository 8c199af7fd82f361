use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::*;
use relay::{ClientKey, Record, Relay, RelayErrorKind};
use service::AppState;
use tokio::sync::mpsc;

use crate::controller::StatusResponse;
use crate::error::error_message;

/// Upgrades to a WebSocket over which records for one client are pushed as they arrive.
///
/// The client identifies itself with its first message, a JSON object carrying
/// `localip`. Any record already waiting for that key is delivered right away.
pub(crate) async fn push_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let handshake = tokio::time::timeout(
        app_state.config.push_handshake_timeout(),
        read_handshake(&mut stream),
    )
    .await;

    let key = match handshake {
        Ok(Some(Ok(key))) => key,
        Ok(Some(Err(kind))) => {
            warn!("Rejecting push connection: {}", error_message(kind));
            reject(&mut sink, kind).await;
            return;
        }
        Ok(None) => {
            debug!("Push connection closed before identifying itself");
            return;
        }
        Err(_) => {
            warn!("Push connection did not identify itself in time");
            reject(&mut sink, RelayErrorKind::MissingClientKey).await;
            return;
        }
    };

    let relay = Arc::clone(&app_state.relay);
    let (tx, mut rx) = mpsc::unbounded_channel::<Record>();
    let connection_id = relay.connect(key.clone(), tx);

    // Ends when the relay drops our sender, i.e. the connection was replaced
    let mut send_task = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let json = match record.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize record for push: {e}");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                debug!("Failed to write to push connection: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let inbound_relay = Arc::clone(&relay);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => relay_inbound(&inbound_relay, text.as_str().as_bytes()),
                Message::Binary(bytes) => relay_inbound(&inbound_relay, &bytes),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!("Push connection for {key} closed");
    relay.disconnect(&key, &connection_id);
}

/// Waits for the identifying message. `None` if the socket closed first.
async fn read_handshake(
    stream: &mut SplitStream<WebSocket>,
) -> Option<Result<ClientKey, RelayErrorKind>> {
    while let Some(Ok(message)) = stream.next().await {
        let parsed = match message {
            Message::Text(text) => Record::from_slice(text.as_str().as_bytes()),
            Message::Binary(bytes) => Record::from_slice(&bytes),
            Message::Close(_) => return None,
            // ping/pong
            _ => continue,
        };
        return Some(
            parsed
                .and_then(|record| record.client_key())
                .map_err(|e| e.error_kind),
        );
    }
    None
}

async fn reject(sink: &mut SplitSink<WebSocket, Message>, kind: RelayErrorKind) {
    match serde_json::to_string(&StatusResponse::error(error_message(kind))) {
        Ok(json) => {
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                debug!("Failed to send push rejection: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize push rejection: {e}"),
    }
    let _ = sink.close().await;
}

/// Relay traffic sent over an established connection is produced like a POSTed record.
fn relay_inbound(relay: &Relay, bytes: &[u8]) {
    match Record::from_slice(bytes).and_then(|record| relay.produce(record)) {
        Ok(delivery) => debug!("Relayed record from push connection: {delivery:?}"),
        Err(e) => debug!("Ignoring push message: {e}"),
    }
}
