use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Opens duplex channels to the backend's push endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn Channel>>;
}

/// One open duplex channel. Only the inbound direction is used.
#[async_trait]
pub trait Channel: Send {
    /// Next text payload. `None` once the peer closed the channel.
    async fn next_text(&mut self) -> Option<anyhow::Result<String>>;
    async fn close(&mut self);
}

pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn Channel>> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("websocket handshake with {}", url))?;
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn next_text(&mut self) -> Option<anyhow::Result<String>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
