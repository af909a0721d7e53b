use crate::RelayService;
use crate::signaling::ConnectionId;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use meshcall_core::{PeerId, RoomId, SignalMessage};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Policy-violation close code sent when no room was given.
const CLOSE_POLICY: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    #[serde(default)]
    pub room: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    State(service): State<RelayService>,
) -> impl IntoResponse {
    let room = RoomId::from(query.room);

    ws.on_upgrade(move |socket| handle_socket(socket, room, service))
}

async fn handle_socket(socket: WebSocket, room: RoomId, service: RelayService) {
    let (mut sender, mut receiver) = socket.split();

    if room.is_empty() {
        warn!("Rejecting WebSocket connection without a room");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "missing room".into(),
            })))
            .await;
        return;
    }

    let connection = service.next_connection_id();
    info!("New WebSocket connection #{} for room {}", connection, room);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let bound: Arc<Mutex<Option<PeerId>>> = Arc::new(Mutex::new(None));

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let room = room.clone();
        let bound = Arc::clone(&bound);

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        let signal = match SignalMessage::decode(text.as_str()) {
                            Ok(signal) => signal,
                            Err(e) => {
                                warn!("Invalid signal on connection #{}: {}", connection, e);
                                continue;
                            }
                        };
                        if !accept(&service, &room, connection, &tx, &bound, &signal) {
                            continue;
                        }
                        service.relay(&signal, &text);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let peer_id = bound.lock().ok().and_then(|mut id| id.take());
    if let Some(peer_id) = peer_id {
        service.unregister(&room, &peer_id, connection);
    }
    info!("WebSocket connection #{} disconnected", connection);
}

/// Checks a decoded frame against the connection. The first accepted frame
/// binds the connection to its sender's identity.
fn accept(
    service: &RelayService,
    room: &RoomId,
    connection: ConnectionId,
    tx: &mpsc::UnboundedSender<Message>,
    bound: &Mutex<Option<PeerId>>,
    signal: &SignalMessage,
) -> bool {
    if signal.room != *room {
        warn!(
            "Dropping {:?} for room {} on connection to room {}",
            signal.kind(),
            signal.room,
            room
        );
        return false;
    }

    let Ok(mut bound) = bound.lock() else {
        return false;
    };
    match bound.as_ref() {
        Some(id) if *id == signal.from => true,
        Some(id) => {
            warn!(
                "Dropping {:?} claiming to be {} on connection bound to {}",
                signal.kind(),
                signal.from,
                id
            );
            false
        }
        None => {
            debug!("Connection #{} bound to {}", connection, signal.from);
            service.register(room, &signal.from, connection, tx.clone());
            *bound = Some(signal.from.clone());
            true
        }
    }
}
