use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::Request;
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument;

use crate::error::ChatError;
use crate::transport::{Transport, TransportEvent, TransportPeer};

/// Validates `endpoint` and spawns the task that owns the socket.
///
/// The handshake happens in the background; its outcome arrives on the
/// returned transport as [`TransportEvent::Opened`] or [`TransportEvent::Failed`].
pub fn spawn(endpoint: &str) -> Result<Transport, ChatError> {
    let request = request_for(endpoint)?;
    if request.uri().scheme_str() == Some("wss") {
        install_crypto_provider();
    }
    let (transport, peer) = Transport::pair();
    tokio::spawn(run(request, peer).instrument(info_span!("websocket", endpoint = %endpoint)));
    Ok(transport)
}

fn request_for(endpoint: &str) -> Result<Request<()>, ChatError> {
    let failed = |reason: String| ChatError::ConnectionFailed {
        endpoint: endpoint.to_string(),
        reason,
    };
    let request = endpoint
        .into_client_request()
        .map_err(|e| failed(e.to_string()))?;
    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => {}
        other => {
            return Err(failed(format!(
                "unsupported scheme {:?}, expected ws or wss",
                other.unwrap_or("")
            )));
        }
    }
    if request.uri().host().is_none() {
        return Err(failed("missing host".to_string()));
    }
    Ok(request)
}

/// `wss` handshakes need a process-wide rustls provider; the first one wins.
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("Crypto provider already installed");
    }
}

async fn run(request: Request<()>, peer: TransportPeer) {
    let TransportPeer {
        events,
        mut outbound,
    } = peer;

    let (stream, _response) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(e) => {
            error!("Handshake failed: {:?}", e);
            let _ = events.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };
    info!("Handshake complete");
    if events.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        debug!("Writing frame: {}", text);
                        if let Err(e) = sink.send(Message::text(text)).await {
                            error!("Write error: {:?}", e);
                            let _ = events.send(TransportEvent::Closed(Some(e.to_string())));
                            return;
                        }
                    }
                    None => {
                        info!("Closing connection");
                        if let Err(e) = sink.close().await {
                            debug!("Close handshake error: {:?}", e);
                        }
                        let _ = events.send(TransportEvent::Closed(None));
                        return;
                    }
                }
            }
            message = stream.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => {
                        TransportEvent::Frame(Bytes::copy_from_slice(text.as_bytes()))
                    }
                    Some(Ok(Message::Binary(data))) => TransportEvent::Frame(data),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty());
                        info!("Server closed connection");
                        TransportEvent::Closed(reason)
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Read error: {:?}", e);
                        TransportEvent::Closed(Some(e.to_string()))
                    }
                    None => TransportEvent::Closed(None),
                };
                let closed = matches!(event, TransportEvent::Closed(_));
                if events.send(event).is_err() || closed {
                    return;
                }
            }
        }
    }
}
