pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod websocket;

// Re-export public items for convenience
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use error::ChatError;
pub use protocol::ChatMessage;
pub use render::{BufferView, Entry, MessageView, Renderer, TerminalView};
pub use session::{ChatSession, InputBox};
pub use transport::{Transport, TransportEvent, TransportPeer};
