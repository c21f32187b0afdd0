use thiserror::Error;

use crate::connection::ConnectionState;

/// Everything the chat client can observe going wrong.
///
/// None of these are fatal: a session reports them and carries on until
/// the connection closes.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The endpoint was unusable or the WebSocket handshake failed.
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// A send was attempted while the connection was not open.
    #[error("not connected (connection is {state})")]
    NotConnected { state: ConnectionState },

    /// An inbound frame was not a valid chat message.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The transport went away underneath a send.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
}
