//! `WebSocket` connection to the Mattermost event API.
//!
//! The same connection type serves two purposes: the long-lived event
//! listener and the short-lived side connection that carries "typing"
//! signals while a reply is being produced.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::backend::{SignalChannel, SignalConnection};
use crate::error::Result;
use crate::types::TypingTarget;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A server-pushed event. Replies to our own actions (`seq_reply`) and
/// `hello` status frames without an `event` field are filtered out.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

pub struct MattermostSocket {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
    seq: u64,
}

impl MattermostSocket {
    pub async fn connect(url: &Url) -> Result<Self> {
        debug!("Connecting to {url}");
        let (ws, _response) = connect_async(url.as_str()).await?;
        let (writer, reader) = ws.split();
        Ok(Self {
            writer,
            reader,
            seq: 0,
        })
    }

    /// Sends `{"seq", "action", "data"}` with the next sequence number.
    async fn send_action(&mut self, action: &str, data: Value) -> Result<()> {
        self.seq += 1;
        let payload = json!({
            "seq": self.seq,
            "action": action,
            "data": data,
        });
        self.writer
            .send(Message::Text(serde_json::to_string(&payload)?.into()))
            .await?;
        Ok(())
    }

    pub async fn authenticate(&mut self, token: &str) -> Result<()> {
        self.send_action("authentication_challenge", json!({ "token": token }))
            .await
    }

    pub async fn send_typing(&mut self, target: &TypingTarget) -> Result<()> {
        self.send_action(
            "user_typing",
            json!({
                "channel_id": target.channel_id,
                "parent_id": target.parent_id,
            }),
        )
        .await
    }

    /// Next server event; `Ok(None)` once the connection is closed.
    pub async fn next_event(&mut self) -> Result<Option<WebSocketEvent>> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    if value.get("event").is_some() {
                        return Ok(Some(serde_json::from_value(value)?));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Server closed connection: {frame:?}");
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "closing".into(),
        };
        self.writer.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalConnection for MattermostSocket {
    async fn authenticate(&mut self, token: &str) -> Result<()> {
        MattermostSocket::authenticate(self, token).await
    }

    async fn send_typing(&mut self, target: &TypingTarget) -> Result<()> {
        MattermostSocket::send_typing(self, target).await
    }

    async fn close(&mut self) -> Result<()> {
        MattermostSocket::close(self).await
    }
}

/// Opens a fresh socket per typing session; the listener's own connection is
/// never shared.
pub struct WebSocketSignal {
    url: Url,
}

impl WebSocketSignal {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl SignalChannel for WebSocketSignal {
    async fn open(&self) -> Result<Box<dyn SignalConnection>> {
        Ok(Box::new(MattermostSocket::connect(&self.url).await?))
    }
}
