use crate::signaling::{ChannelError, InboundFrame, SignalingConnector, SignalingLink, SignalingOutput};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcall_core::utils::ROOM_QUERY_PARAM;
use meshcall_core::{PeerId, RoomId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Connects to a relay websocket endpoint such as `ws://host:8080/ws`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: Url,
}

impl WsConnector {
    pub fn new(endpoint: &str) -> Result<Self, ChannelError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ChannelError::Connect(e.to_string()))?;
        // Built without a TLS backend, so only plain websockets connect.
        match endpoint.scheme() {
            "ws" => Ok(Self { endpoint }),
            other => Err(ChannelError::Connect(format!(
                "unsupported scheme '{}', expected ws",
                other
            ))),
        }
    }

    pub fn room_url(&self, room: &RoomId) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(ROOM_QUERY_PARAM, room.as_str());
        url
    }
}

#[async_trait]
impl SignalingConnector for WsConnector {
    async fn connect(
        &self,
        room: &RoomId,
        identity: &PeerId,
    ) -> Result<SignalingLink, ChannelError> {
        let url = self.room_url(room);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        info!("Signaling connected to {} as {}", url, identity);

        let (mut sender, mut receiver) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match receiver.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(InboundFrame::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by relay".to_owned());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "connection dropped".to_owned(),
                }
            };
            debug!("Signaling inbound stream finished: {}", reason);
            let _ = in_tx.send(InboundFrame::Closed(reason));
        });

        Ok(SignalingLink {
            output: Arc::new(WsOutput { tx: out_tx }),
            inbound: in_rx,
        })
    }
}

struct WsOutput {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl SignalingOutput for WsOutput {
    async fn send(&self, msg: SignalMessage) -> Result<(), ChannelError> {
        let json = msg
            .encode()
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        self.tx
            .send(Message::Text(json.into()))
            .map_err(|_| ChannelError::Closed("websocket writer has stopped".to_owned()))
    }

    async fn close(&self) {
        if self.tx.send(Message::Close(None)).is_err() {
            warn!("Signaling writer already stopped before close");
        }
    }
}
