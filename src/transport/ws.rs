use crate::config::TransportConfig;
use crate::consts::AUTHORIZATION_HEADER;
use crate::transport::link::{Connector, Inbound, Link, Outbound};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use voice_duplex_types::ServerEvent;

const INBOUND_CAPACITY: usize = 256;

pub fn build_request(
    base_url: &str,
    api_key: Option<&SecretString>,
) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = base_url.into_client_request()?;
    if let Some(api_key) = api_key {
        request.headers_mut().insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", api_key.expose_secret()).as_str().parse()?,
        );
    }
    Ok(request)
}

/// WebSocket connection to the speech backend.
///
/// Each link runs one writer task and one reader task. Audio goes out as binary frames,
/// control events as JSON text.
pub struct WsConnector {
    base_url: String,
    api_key: Option<SecretString>,
    capacity: usize,
}

impl WsConnector {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            api_key: config.api_key().cloned(),
            capacity: config.outbound_capacity.max(1),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> anyhow::Result<Link> {
        let request = build_request(&self.base_url, self.api_key.as_ref())
            .context("Failed to build backend request")?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;
        tracing::info!("Connected to speech backend at {}", self.base_url);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(self.capacity);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(INBOUND_CAPACITY);

        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                let message = match outbound {
                    Outbound::Audio(bytes) => Message::Binary(bytes),
                    Outbound::Event(event) => match serde_json::to_string(&event) {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            tracing::error!("failed to serialize event: {}", e);
                            continue;
                        }
                    },
                    Outbound::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "session ended".into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            tracing::warn!("failed to send close frame: {}", e);
                        }
                        break;
                    }
                };
                if let Err(e) = write.send(message).await {
                    tracing::error!("failed to send message: {}", e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let closed = loop {
                let message = match read.next().await {
                    None => {
                        break Inbound::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("failed to read message: {}", e);
                        break Inbound::Closed {
                            code: None,
                            reason: e.to_string(),
                        };
                    }
                    Some(Ok(message)) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            tracing::debug!("received message: {}", event.kind());
                            if in_tx.send(Inbound::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        break match frame {
                            Some(frame) => Inbound::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.to_string(),
                            },
                            None => Inbound::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    _ => {}
                }
            };
            let _ = in_tx.send(closed).await;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_bearer_token() {
        let key = SecretString::from("sk-test".to_string());
        let request = build_request("ws://127.0.0.1:8765/v1/duplex", Some(&key)).unwrap();
        assert_eq!(request.uri().path(), "/v1/duplex");
        assert_eq!(
            request.headers().get(AUTHORIZATION_HEADER).unwrap(),
            "Bearer sk-test"
        );
    }

    #[test]
    fn request_without_key_has_no_authorization() {
        let request = build_request("wss://speech.example/v1", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION_HEADER).is_none());
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(build_request("not a url", None).is_err());
    }
}
