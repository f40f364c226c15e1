use async_trait::async_trait;
use tokio::sync::mpsc;
use voice_duplex_types::{ClientEvent, ServerEvent};

/// A frame headed for the speech backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Raw PCM16 captured audio.
    Audio(Vec<u8>),
    Event(ClientEvent),
    /// Close the channel on purpose. Nothing is sent after it.
    Close,
}

/// Something the backend sent us.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    /// The channel closed. Always the last item on a link.
    Closed { code: Option<u16>, reason: String },
}

/// One live duplex channel. Dropping `outbound` lets the writer finish; `inbound` ending
/// without [`Inbound::Closed`] means the link was lost abruptly.
pub struct Link {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Opens duplex channels to the speech backend.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> anyhow::Result<Link>;
}
