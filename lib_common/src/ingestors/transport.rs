//! # Feed Transport
//!
//! The ingestor speaks to the exchange through [`FeedTransport`], a minimal
//! text-frame channel. [`WsTransport`] is the production implementation over
//! `tokio-tungstenite`; tests drive the ingestor with scripted transports.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use crate::ingestors::protocol::RpcErrorBody;

/// Failures talking to the exchange.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The connection could not be established or a read/write failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange closed the connection.
    #[error("connection closed by upstream")]
    Closed,

    /// A response could not be decoded into the expected shape.
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The exchange answered with an error object.
    #[error("{method} rejected by upstream: {} ({})", .error.message, .error.code)]
    Rpc {
        method: &'static str,
        error: RpcErrorBody,
    },

    /// The response id does not belong to the request just sent.
    #[error("{method} response id {got:?} does not match request id {expected}")]
    Correlation {
        method: &'static str,
        expected: u64,
        got: Option<u64>,
    },

    /// The response had neither `result` nor `error`.
    #[error("{method} response carries no result")]
    MissingResult { method: &'static str },
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(e.to_string())
    }
}

/// Bidirectional text channel to the exchange.
pub trait FeedTransport: Send {
    /// Sends one text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Waits for the next text frame. `Ok(None)` means the peer closed the stream.
    fn next_text(&mut self) -> impl Future<Output = Result<Option<String>, FeedError>> + Send;
}

/// WebSocket transport backed by `tokio-tungstenite`.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Opens a WebSocket connection to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str) -> Result<Self, FeedError> {
        log::info!("Connecting to exchange WSS: {}", url);
        let (stream, _) = connect_async(url).await?;
        log::info!("Connected to exchange WSS.");
        Ok(Self { stream })
    }

    /// Sends a close frame; errors are irrelevant at this point.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

impl FeedTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), FeedError> {
        log::trace!("Sending upstream: {}", text);
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>, FeedError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(bin))) => {
                    log::debug!("Skipping binary frame from exchange: {} bytes", bin.len());
                }
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    log::warn!("Exchange sent close frame: {:?}", frame);
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }
}
