//! WebSocket transport for the client.
//!
//! Provides [`ConnectedClient`] which handles WebSocket I/O for frame
//! transport. Each binary WebSocket message carries exactly one encoded
//! [`Frame`]. This is a thin layer that only moves frames; protocol logic
//! remains in the Sans-IO [`Client`](crate::Client).

use futures_util::{SinkExt, StreamExt};
use parley_proto::Frame;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

/// Capacity of the frame channels in each direction.
const CHANNEL_CAPACITY: usize = 32;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error on an established connection.
    #[error("stream error: {0}")]
    Stream(String),

    /// The server closed the connection.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Handle to a connected WebSocket transport.
///
/// Frames are sent and received via the channels; an internal task handles
/// the socket. The inbound channel yields one `Err` describing why the
/// connection ended and then closes.
pub struct ConnectedClient {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Frames from the server, or the terminal error.
    pub from_server: mpsc::Receiver<Result<Frame, TransportError>>,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection task.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Connect to a Parley server at a `ws://` or `wss://` URL.
pub async fn connect(url: &str) -> Result<ConnectedClient, TransportError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    tracing::debug!(url, "websocket connected");
    Ok(spawn(stream))
}

/// Bridge an established WebSocket stream to frame channels.
pub fn spawn<S>(stream: WebSocketStream<S>) -> ConnectedClient
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
    let (from_server_tx, from_server_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_connection(stream, to_server_rx, from_server_tx));

    ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    }
}

async fn run_connection<S>(
    stream: WebSocketStream<S>,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Result<Frame, TransportError>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    let outcome = loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(frame) = outgoing else {
                    // Handle dropped: close politely.
                    let _ = sink.close().await;
                    return;
                };
                let bytes = match frame.to_vec() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unencodable frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                    break TransportError::Stream(e.to_string());
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Binary(data))) => match Frame::decode(&data) {
                    Ok(frame) => {
                        if from_server.send(Ok(frame)).await.is_err() {
                            return;
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(close))) => {
                    let reason = close.map(|c| c.reason.as_str().to_owned()).unwrap_or_default();
                    break TransportError::Closed(reason);
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break TransportError::Stream(e.to_string()),
                None => break TransportError::Closed("stream ended".to_string()),
            },
        }
    };

    tracing::debug!(error = %outcome, "websocket connection ended");
    let _ = from_server.send(Err(outcome)).await;
}
