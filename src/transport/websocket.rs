//! WebSocket transport for the live API
//!
//! One task per connection pumps both directions so that outbound frames
//! leave in capture order and inbound messages are delivered in arrival
//! order.

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::transport::protocol::{ClientMessage, ServerMessage};
use crate::transport::{ConnectRequest, Connector, LiveConnection, Outbound, TransportEvent};

/// Connects to the bidirectional streaming endpoint over WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    api_key: Option<String>,
}

impl WebSocketConnector {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Endpoint with the API key appended as a query parameter
    pub fn url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let sep = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.endpoint, sep, key)
            }
            None => self.endpoint.clone(),
        }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<LiveConnection, TransportError>> {
        let url = self.url();
        let endpoint = self.endpoint.clone();

        async move {
            let setup = ClientMessage::setup(&request).to_json()?;

            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            info!(endpoint = %endpoint, model = %request.model, "websocket connected");

            let (mut write, read) = socket.split();
            write
                .send(Message::Text(setup))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            let (outbound_tx, outbound_rx) = unbounded_channel();
            let (events_tx, events_rx) = unbounded_channel();
            tokio::spawn(pump(write, read, outbound_rx, events_tx));

            Ok(LiveConnection {
                outbound: outbound_tx,
                events: events_rx,
            })
        }
        .boxed()
    }
}

/// Move traffic between the socket and the connection channels until
/// either side closes. Emits exactly one `Closed`.
async fn pump<W, R>(
    mut write: W,
    mut read: R,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<TransportEvent>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut opened = false;
    let mut frames_sent: u64 = 0;

    let reason = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Audio(frame)) => {
                    let text = match ClientMessage::audio(&frame).to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("dropping unserializable frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        error!("send failed: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break format!("send failed: {}", e);
                    }
                    frames_sent += 1;
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break "closed by client".to_string();
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&text, &mut opened, &events);
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => dispatch(&text, &mut opened, &events),
                    Err(_) => warn!("ignoring non-UTF-8 binary message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break close_reason(frame);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("websocket error: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break e.to_string();
                }
                None => break "connection ended".to_string(),
            },
        }
    };

    debug!(frames_sent, reason = %reason, "websocket pump finished");
    let _ = events.send(TransportEvent::Closed { reason });
}

fn dispatch(text: &str, opened: &mut bool, events: &UnboundedSender<TransportEvent>) {
    match ServerMessage::parse(text) {
        Ok(ServerMessage::SetupComplete) => {
            if !*opened {
                *opened = true;
                let _ = events.send(TransportEvent::Open);
            }
        }
        Ok(message) => {
            let _ = events.send(TransportEvent::Message(message));
        }
        Err(e) => warn!("skipping undecodable server message: {}", e),
    }
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => format!("{} ({})", frame.reason, u16::from(frame.code)),
        Some(frame) => format!("closed by server ({})", u16::from(frame.code)),
        None => "closed by server".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AudioFrame, SampleFormat};
    use serde_json::Value;
    use tokio::net::TcpListener;

    #[test]
    fn test_url_appends_key() {
        let connector = WebSocketConnector::new("wss://example.test/ws", Some("abc".to_string()));
        assert_eq!(connector.url(), "wss://example.test/ws?key=abc");

        let connector = WebSocketConnector::new("wss://example.test/ws?alt=1", Some("abc".to_string()));
        assert_eq!(connector.url(), "wss://example.test/ws?alt=1&key=abc");

        let connector = WebSocketConnector::new("ws://localhost:1", None);
        assert_eq!(connector.url(), "ws://localhost:1");
    }

    #[tokio::test]
    async fn test_roundtrip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let setup = ws.next().await.unwrap().unwrap().into_text().unwrap();
            let setup: Value = serde_json::from_str(&setup).unwrap();
            assert_eq!(setup["setup"]["model"], "models/test");

            ws.send(Message::Text(r#"{"setupComplete":{}}"#.into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"serverContent":{"inputTranscription":{"text":"hello"}}}"#.into(),
            ))
            .await
            .unwrap();

            let audio = ws.next().await.unwrap().unwrap().into_text().unwrap();
            let audio: Value = serde_json::from_str(&audio).unwrap();
            assert_eq!(audio["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");

            ws.close(None).await.unwrap();
        });

        let connector = WebSocketConnector::new(format!("ws://{}", addr), None);
        let request = ConnectRequest {
            model: "models/test".to_string(),
            ..ConnectRequest::default()
        };
        let mut connection = connector.connect(request).await.unwrap();

        assert_eq!(connection.events.recv().await, Some(TransportEvent::Open));
        match connection.events.recv().await {
            Some(TransportEvent::Message(ServerMessage::Content(content))) => {
                assert_eq!(content.input_transcription.as_deref(), Some("hello"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let frame = AudioFrame::new(vec![0u8; 320], SampleFormat::outbound());
        assert!(connection.send(Outbound::Audio(frame)));

        match connection.events.recv().await {
            Some(TransportEvent::Closed { .. }) => {}
            other => panic!("expected close, got {:?}", other),
        }
        assert_eq!(connection.events.recv().await, None);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::new(format!("ws://{}", addr), None);
        let result = connector.connect(ConnectRequest::default()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
