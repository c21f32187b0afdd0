use std::fmt;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::protocol::ChatMessage;
use crate::transport::{Transport, TransportEvent};
use crate::websocket;

const EVENT_CAPACITY: usize = 100;

/// Lifecycle of the single connection. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What subscribers of a [`ConnectionManager`] get to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Message(ChatMessage),
    /// An inbound frame was dropped because it could not be decoded.
    Malformed(String),
    Failed(String),
    Closed(Option<String>),
}

/// Owns the one connection to the chat endpoint and mediates all transport.
///
/// Transport events are fed through [`ConnectionManager::apply`], which
/// drives the `Connecting -> Open -> Closed` state machine and publishes a
/// [`ConnectionEvent`] to every subscriber.
pub struct ConnectionManager {
    endpoint: String,
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    subscribers: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Starts connecting to a `ws://` or `wss://` endpoint.
    ///
    /// Returns as soon as the handshake is under way; the outcome shows up
    /// later as [`ConnectionEvent::Connected`] or [`ConnectionEvent::Failed`].
    /// Must be called from inside a tokio runtime.
    ///
    /// # Examples
    /// ```rust,no_run
    /// # async fn doc_test() -> anyhow::Result<()> {
    /// use tokio_chat_client::ConnectionManager;
    ///
    /// let mut connection = ConnectionManager::connect("ws://localhost:3000/ws")?;
    /// let mut events = connection.subscribe();
    /// connection.next_event().await;
    /// println!("{:?}", events.recv().await?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(endpoint: &str) -> Result<Self, ChatError> {
        let transport = websocket::spawn(endpoint)?;
        Ok(Self::with_transport(endpoint, transport))
    }

    /// Builds a manager over an already prepared transport, in `Connecting`.
    pub fn with_transport(endpoint: impl Into<String>, transport: Transport) -> Self {
        let (subscribers, _) = broadcast::channel(EVENT_CAPACITY);
        ConnectionManager {
            endpoint: endpoint.into(),
            state: ConnectionState::Connecting,
            outbound: Some(transport.outbound),
            inbound: transport.events,
            subscribers,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.subscribers.subscribe()
    }

    /// Waits for the next transport event and applies it.
    ///
    /// Returns `false` once the transport has nothing more to say.
    pub async fn next_event(&mut self) -> bool {
        match self.inbound.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => {
                if self.state != ConnectionState::Closed {
                    self.close_with(None);
                }
                false
            }
        }
    }

    /// Feeds one transport event through the state machine.
    pub fn apply(&mut self, event: TransportEvent) {
        match (self.state, event) {
            (ConnectionState::Closed, event) => {
                debug!("Ignoring {:?} on closed connection", event);
            }
            (ConnectionState::Connecting, TransportEvent::Opened) => {
                self.state = ConnectionState::Open;
                info!("Connected to {}", self.endpoint);
                self.publish(ConnectionEvent::Connected);
            }
            (ConnectionState::Connecting, TransportEvent::Failed(reason)) => {
                warn!("Connection to {} failed: {}", self.endpoint, reason);
                self.state = ConnectionState::Closed;
                self.outbound = None;
                self.publish(ConnectionEvent::Failed(reason));
            }
            (ConnectionState::Open, TransportEvent::Frame(payload)) => {
                match ChatMessage::from_frame(&payload) {
                    Ok(message) => {
                        debug!("Received: {:?}", message);
                        self.publish(ConnectionEvent::Message(message));
                    }
                    Err(e) => {
                        warn!("Dropping inbound frame: {}", e);
                        self.publish(ConnectionEvent::Malformed(e.to_string()));
                    }
                }
            }
            (_, TransportEvent::Closed(reason)) => {
                self.close_with(reason);
            }
            (ConnectionState::Connecting, TransportEvent::Frame(payload)) => {
                debug!("Dropping {} byte frame received before open", payload.len());
            }
            (state, event @ (TransportEvent::Opened | TransportEvent::Failed(_))) => {
                warn!("Unexpected {:?} while {}", event, state);
            }
        }
    }

    /// Serializes `message` and queues it as one text frame.
    ///
    /// Fails with [`ChatError::NotConnected`] unless the connection is open;
    /// nothing is written in that case.
    pub fn send(&mut self, message: &ChatMessage) -> Result<(), ChatError> {
        if self.state != ConnectionState::Open {
            return Err(ChatError::NotConnected { state: self.state });
        }
        let Some(outbound) = &self.outbound else {
            return Err(ChatError::NotConnected { state: self.state });
        };
        let json = message.to_json()?;
        if outbound.send(json.clone()).is_err() {
            self.close_with(None);
            return Err(ChatError::ConnectionClosed);
        }
        info!("Sent: {}", json);
        Ok(())
    }

    /// Local teardown. The transport sends a close frame once it notices.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.close_with(None);
        }
    }

    fn close_with(&mut self, reason: Option<String>) {
        match &reason {
            Some(reason) => info!("Connection to {} closed: {}", self.endpoint, reason),
            None => info!("Connection to {} closed", self.endpoint),
        }
        self.state = ConnectionState::Closed;
        self.outbound = None;
        self.publish(ConnectionEvent::Closed(reason));
    }

    fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine; the event is simply not observed.
        let _ = self.subscribers.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::broadcast::error::TryRecvError;

    fn manager() -> (ConnectionManager, crate::transport::TransportPeer) {
        let (transport, peer) = Transport::pair();
        (
            ConnectionManager::with_transport("ws://localhost:3000/ws", transport),
            peer,
        )
    }

    fn frame(raw: &str) -> TransportEvent {
        TransportEvent::Frame(Bytes::copy_from_slice(raw.as_bytes()))
    }

    #[test]
    fn send_before_open_is_not_connected() {
        let (mut connection, mut peer) = manager();
        let message = ChatMessage::new("michael", "hi").unwrap();

        let err = connection.send(&message).unwrap_err();
        assert!(matches!(
            err,
            ChatError::NotConnected {
                state: ConnectionState::Connecting
            }
        ));
        assert!(peer.drain_outbound().is_empty());
    }

    #[test]
    fn opens_then_sends_json() {
        let (mut connection, mut peer) = manager();
        let mut events = connection.subscribe();

        connection.apply(TransportEvent::Opened);
        assert_eq!(connection.state(), ConnectionState::Open);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Connected);

        let message = ChatMessage::new("michael", "hi there").unwrap();
        connection.send(&message).unwrap();
        assert_eq!(
            peer.drain_outbound(),
            vec![r#"{"from":"michael","text":"hi there"}"#.to_string()]
        );
    }

    #[test]
    fn publishes_frames_in_arrival_order() {
        let (mut connection, _peer) = manager();
        let mut events = connection.subscribe();
        connection.apply(TransportEvent::Opened);
        let _ = events.try_recv();

        for i in 0..10 {
            connection.apply(frame(&format!(r#"{{"from":"alice","text":"m{i}"}}"#)));
        }
        for i in 0..10 {
            match events.try_recv().unwrap() {
                ConnectionEvent::Message(message) => {
                    assert_eq!(message.text(), format!("m{i}"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn malformed_frame_is_dropped_and_reported() {
        let (mut connection, _peer) = manager();
        let mut events = connection.subscribe();
        connection.apply(TransportEvent::Opened);
        let _ = events.try_recv();

        connection.apply(frame("{not json"));
        assert!(matches!(
            events.try_recv().unwrap(),
            ConnectionEvent::Malformed(_)
        ));
        assert_eq!(connection.state(), ConnectionState::Open);

        connection.apply(frame(r#"{"from":"alice","text":"still here"}"#));
        assert!(matches!(
            events.try_recv().unwrap(),
            ConnectionEvent::Message(_)
        ));
    }

    #[test]
    fn failed_handshake_closes_for_good() {
        let (mut connection, mut peer) = manager();
        let mut events = connection.subscribe();

        connection.apply(TransportEvent::Failed("refused".to_string()));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(
            events.try_recv().unwrap(),
            ConnectionEvent::Failed("refused".to_string())
        );

        connection.apply(TransportEvent::Opened);
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        let message = ChatMessage::new("michael", "hi").unwrap();
        assert!(matches!(
            connection.send(&message),
            Err(ChatError::NotConnected {
                state: ConnectionState::Closed
            })
        ));
        assert!(peer.drain_outbound().is_empty());
    }

    #[test]
    fn close_is_published_once() {
        let (mut connection, _peer) = manager();
        let mut events = connection.subscribe();
        connection.apply(TransportEvent::Opened);
        let _ = events.try_recv();

        connection.apply(TransportEvent::Closed(Some("bye".to_string())));
        connection.apply(TransportEvent::Closed(None));
        connection.close();
        connection.apply(frame(r#"{"from":"alice","text":"late"}"#));

        assert_eq!(
            events.try_recv().unwrap(),
            ConnectionEvent::Closed(Some("bye".to_string()))
        );
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn send_after_transport_dropped_closes() {
        let (mut connection, peer) = manager();
        let mut events = connection.subscribe();
        connection.apply(TransportEvent::Opened);
        let _ = events.try_recv();
        drop(peer);

        let message = ChatMessage::new("michael", "hi").unwrap();
        assert!(matches!(
            connection.send(&message),
            Err(ChatError::ConnectionClosed)
        ));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Closed(None));
    }

    #[tokio::test]
    async fn next_event_applies_in_order_and_ends_with_transport() {
        let (mut connection, peer) = manager();
        let mut events = connection.subscribe();

        peer.emit(TransportEvent::Opened);
        peer.emit(frame(r#"{"from":"alice","text":"hello"}"#));
        peer.emit(TransportEvent::Closed(None));
        drop(peer);

        assert!(connection.next_event().await);
        assert!(connection.next_event().await);
        assert!(connection.next_event().await);
        assert!(!connection.next_event().await);

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Message(ChatMessage::new("alice", "hello").unwrap())
        );
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed(None));
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn frame_before_open_is_dropped() {
        let (mut connection, _peer) = manager();
        let mut events = connection.subscribe();

        connection.apply(frame(r#"{"from":"alice","text":"early"}"#));
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        connection.apply(TransportEvent::Opened);
        connection.apply(TransportEvent::Opened);
        assert_eq!(connection.state(), ConnectionState::Open);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Connected);
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }
}
