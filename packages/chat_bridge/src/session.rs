//! Per-connection handler.
//!
//! A [`Session`] is registered with the hub while its socket is open. All
//! writes go through the session's outbound channel and a single writer loop,
//! so frames from concurrent broadcasts never interleave on one socket.
//!
//! The hub owns the only strong sender once the session is open. When the hub
//! drops a session whose queue filled up, the channel closes and the writer
//! loop ends the connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::{Frame, MessageType};
use crate::hub::{Hub, Outbound, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Forwarded to the hub as a publish request.
    Published,
    /// Decoded, but not a type clients may send.
    Ignored(u8),
    /// Dropped; an error frame was queued for the client.
    Rejected(String),
}

pub struct Session {
    id: SessionId,
    state: SessionState,
    hub: Arc<Hub>,
    outbound: mpsc::WeakSender<Bytes>,
    registration: Option<Outbound>,
}

impl Session {
    pub fn new(hub: Arc<Hub>, outbound: Outbound) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Connecting,
            hub,
            outbound: outbound.downgrade(),
            registration: Some(outbound),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register with the hub. The hub queues the greeting.
    pub async fn open(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        if let Some(outbound) = self.registration.take() {
            self.hub.register(self.id, outbound).await;
        }
        self.state = SessionState::Open;
    }

    /// Decode one inbound message and act on it.
    ///
    /// Never closes the session: bad frames are dropped and reported back to
    /// the client as an error frame.
    pub fn handle_inbound(&self, data: &[u8]) -> Inbound {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = %self.id, code = e.error_code(), "Dropping malformed frame: {}", e);
                return self.reject(format!("Malformed frame: {e}"));
            }
        };

        match frame.message_type() {
            Some(MessageType::SendMessage) => match frame.into_fields().into_iter().next() {
                Some(text) => {
                    self.hub.request_send(text);
                    Inbound::Published
                }
                None => {
                    warn!(session_id = %self.id, "Send request without message text");
                    self.reject("Send request is missing the message text".to_string())
                }
            },
            _ => {
                debug!(session_id = %self.id, kind = frame.kind(), "Ignoring client frame");
                Inbound::Ignored(frame.kind())
            }
        }
    }

    /// Deregister from the hub. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.hub.deregister(&self.id).await;
        self.state = SessionState::Closed;
    }

    fn reject(&self, reason: String) -> Inbound {
        match Frame::new(MessageType::Error, vec![reason.clone()]) {
            Ok(frame) => match self.outbound.upgrade() {
                Some(outbound) => {
                    if let Err(e) = outbound.try_send(frame.encode()) {
                        debug!(session_id = %self.id, "Could not queue error frame: {}", e);
                    }
                }
                None => debug!(session_id = %self.id, "Session no longer registered"),
            },
            Err(e) => warn!(session_id = %self.id, "Failed to build error frame: {}", e),
        }
        Inbound::Rejected(reason)
    }
}

/// Drive one upgraded WebSocket until it closes.
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(hub.queue_capacity());

    let mut session = Session::new(hub, tx);
    info!(session_id = %session.id(), "New WebSocket connection");
    session.open().await;

    loop {
        tokio::select! {
            bytes = rx.recv() => match bytes {
                Some(bytes) => {
                    if let Err(e) = sender.send(Message::Binary(bytes)).await {
                        warn!(session_id = %session.id(), "Write failed, closing session: {}", e);
                        break;
                    }
                }
                None => {
                    warn!(session_id = %session.id(), "Dropped by hub, closing session");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    session.handle_inbound(&data);
                }
                Some(Ok(Message::Text(text))) => {
                    session.handle_inbound(text.as_str().as_bytes());
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session_id = %session.id(), "WebSocket connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session.id(), "WebSocket error, closing session: {}", e);
                    break;
                }
            }
        }
    }

    session.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    use crate::source::tests::RecordingSource;

    fn setup() -> (
        Session,
        Receiver<Bytes>,
        Arc<Hub>,
        Arc<RecordingSource>,
    ) {
        let source = Arc::new(RecordingSource::default());
        let hub = Arc::new(Hub::new(source.clone(), "Hello!", 10).unwrap());
        let (tx, rx) = mpsc::channel(8);
        (Session::new(hub.clone(), tx), rx, hub, source)
    }

    fn encode(kind: MessageType, fields: &[&str]) -> Bytes {
        Frame::new(kind, fields.iter().map(|s| s.to_string()).collect())
            .unwrap()
            .encode()
    }

    #[tokio::test]
    async fn lifecycle_registers_and_deregisters() {
        let (mut session, mut rx, hub, _) = setup();
        assert_eq!(session.state(), SessionState::Connecting);

        session.open().await;
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(hub.session_count().await, 1);

        let hello = Frame::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(hello.message_type(), Some(MessageType::Hello));
        assert_eq!(hello.fields(), &["Hello!"]);

        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn send_message_forwards_first_field() {
        let (mut session, _rx, _hub, source) = setup();
        session.open().await;

        let result = session.handle_inbound(&encode(MessageType::SendMessage, &["hi", "extra"]));
        assert_eq!(result, Inbound::Published);
        assert_eq!(source.requests(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn other_types_are_ignored_silently() {
        let (mut session, mut rx, _hub, source) = setup();
        session.open().await;
        rx.recv().await.unwrap();

        let result = session.handle_inbound(&encode(MessageType::Hello, &["hey"]));
        assert_eq!(result, Inbound::Ignored(3));
        let result = session.handle_inbound(&[99, 0, 0]);
        assert_eq!(result, Inbound::Ignored(99));

        assert!(source.requests().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn truncated_frame_is_dropped_with_error_frame() {
        let (mut session, mut rx, hub, source) = setup();
        session.open().await;
        rx.recv().await.unwrap();

        let result = session.handle_inbound(&[1, 0, 1, 0, 10, b'x']);
        assert!(matches!(result, Inbound::Rejected(_)));
        assert!(source.requests().is_empty());

        let error = Frame::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(error.message_type(), Some(MessageType::Error));
        assert!(error.fields()[0].starts_with("Malformed frame"));

        // Still registered and usable
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(hub.session_count().await, 1);
        let result = session.handle_inbound(&encode(MessageType::SendMessage, &["ok"]));
        assert_eq!(result, Inbound::Published);
    }

    #[tokio::test]
    async fn send_without_text_is_rejected() {
        let (mut session, mut rx, _hub, source) = setup();
        session.open().await;
        rx.recv().await.unwrap();

        let result = session.handle_inbound(&encode(MessageType::SendMessage, &[]));
        assert!(matches!(result, Inbound::Rejected(_)));
        assert!(source.requests().is_empty());

        let error = Frame::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(error.message_type(), Some(MessageType::Error));
    }

    #[tokio::test]
    async fn channel_closes_once_hub_drops_session() {
        let (mut session, mut rx, hub, _) = setup();
        session.open().await;
        rx.recv().await.unwrap();

        // The hub holds the only sender, so dropping the session's entry
        // ends the writer loop.
        hub.deregister(&session.id()).await;
        assert!(rx.recv().await.is_none());

        let result = session.handle_inbound(&[1, 0, 1, 0, 10, b'x']);
        assert!(matches!(result, Inbound::Rejected(_)));
    }
}
