use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::error::ChatError;
use crate::protocol::ChatMessage;
use crate::render::{MessageView, Renderer};
use crate::transport::TransportEvent;

/// What the user is currently typing.
#[derive(Debug, Default, Clone)]
pub struct InputBox {
    value: String,
}

impl InputBox {
    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Everything one chat client needs, built once at startup: the connection,
/// the input box and the rendered log.
///
/// All methods run on one task. The only other task is the socket pump
/// behind the [`ConnectionManager`].
pub struct ChatSession<V> {
    identity: String,
    connection: ConnectionManager,
    events: broadcast::Receiver<ConnectionEvent>,
    renderer: Renderer<V>,
    input: InputBox,
}

impl<V: MessageView> ChatSession<V> {
    /// Connects to the configured endpoint and renders into `view`.
    pub fn connect(config: &ClientConfig, view: V) -> Result<Self, ChatError> {
        let connection = ConnectionManager::connect(&config.endpoint)?;
        Ok(Self::new(config.identity.clone(), connection, view))
    }

    pub fn new(identity: impl Into<String>, connection: ConnectionManager, view: V) -> Self {
        let events = connection.subscribe();
        ChatSession {
            identity: identity.into(),
            connection,
            events,
            renderer: Renderer::new(view),
            input: InputBox::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn view(&self) -> &V {
        self.renderer.view()
    }

    pub fn input(&self) -> &InputBox {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputBox {
        &mut self.input
    }

    /// Submits `raw` as the local identity.
    ///
    /// Blank input is ignored: `Ok(None)`, nothing is sent and the input box
    /// is left alone. The input box is cleared only after a successful send.
    pub fn submit(&mut self, raw: &str) -> Result<Option<ChatMessage>, ChatError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let message = ChatMessage::new(self.identity.as_str(), text)?;
        self.connection.send(&message)?;
        self.input.clear();
        Ok(Some(message))
    }

    /// Submits whatever is in the input box.
    pub fn submit_input(&mut self) -> Result<Option<ChatMessage>, ChatError> {
        let raw = self.input.value().to_string();
        self.submit(&raw)
    }

    /// Reacts to one published connection event.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => info!("Connected as {}", self.identity),
            ConnectionEvent::Message(message) => self.renderer.render(&message),
            ConnectionEvent::Malformed(reason) => debug!("Skipped frame: {}", reason),
            ConnectionEvent::Failed(reason) => error!("Could not connect: {}", reason),
            ConnectionEvent::Closed(Some(reason)) => info!("Session ended: {}", reason),
            ConnectionEvent::Closed(None) => info!("Session ended"),
        }
    }

    /// Injects a transport event and handles whatever it publishes.
    pub fn apply(&mut self, event: TransportEvent) {
        self.connection.apply(event);
        self.dispatch();
    }

    /// Waits for one transport event and handles it.
    ///
    /// Returns `false` once the transport is gone for good.
    pub async fn step(&mut self) -> bool {
        let live = self.connection.next_event().await;
        self.dispatch();
        live
    }

    /// Local teardown.
    pub fn close(&mut self) {
        self.connection.close();
        self.dispatch();
    }

    /// Drives the session until `input` runs out.
    ///
    /// Each line of `input` is one submission; bytes that are not UTF-8 are
    /// replaced rather than rejected. A closed connection does not stop the
    /// loop; later submissions just fail with `NotConnected`, reported on the
    /// view. A read error on `input` ends the loop like EOF does.
    pub async fn run<R>(mut self, mut input: R) -> Result<V>
    where
        R: AsyncBufRead + Unpin,
    {
        // Survives cancelled reads; `read_until` resumes into it.
        let mut buf = Vec::new();
        let mut transport_live = true;

        loop {
            tokio::select! {
                // Transport first, so state changes land before the next submission.
                biased;

                live = self.connection.next_event(), if transport_live => {
                    self.dispatch();
                    transport_live = live;
                }
                read = input.read_until(b'\n', &mut buf) => {
                    let eof = match read {
                        Ok(n) => n == 0,
                        Err(e) => {
                            error!("Failed to read input: {}", e);
                            true
                        }
                    };
                    if !buf.is_empty() {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        buf.clear();
                        self.submit_line(line);
                    }
                    if eof {
                        info!("Input closed");
                        break;
                    }
                }
            }
        }

        self.close();
        Ok(self.renderer.into_view())
    }

    fn submit_line(&mut self, line: String) {
        self.input.set(line);
        if let Err(e) = self.submit_input() {
            warn!("Message not sent: {}", e);
            self.renderer.notice(&format!("message not sent: {e}"));
        }
    }

    fn dispatch(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Missed {} connection events", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
