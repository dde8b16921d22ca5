//! Upstream chat source adapter.
//!
//! The hub only needs one thing from the chat system: somewhere to hand
//! publish requests. The chat system in turn reports accepted messages by
//! calling [`Hub::deliver`](crate::hub::Hub::deliver).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::message::ChatMessage;

/// The upstream chat system, as seen by the hub.
pub trait EventSource: Send + Sync {
    /// Ask upstream to publish `text`. Upstream decides whether to accept it,
    /// who it is attributed to, and when it is timestamped.
    ///
    /// Must not block on network I/O.
    fn request_publish(&self, text: String);
}

/// Source for standalone use: accepts every request and echoes it back to
/// all clients under a fixed display name.
pub struct LoopbackSource {
    sender: mpsc::UnboundedSender<String>,
}

/// Receiving half of a [`LoopbackSource`], driven by [`run_loopback`].
pub struct LoopbackReceiver {
    receiver: mpsc::UnboundedReceiver<String>,
    display_name: String,
}

impl LoopbackSource {
    pub fn new(display_name: impl Into<String>) -> (Self, LoopbackReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender },
            LoopbackReceiver {
                receiver,
                display_name: display_name.into(),
            },
        )
    }
}

impl EventSource for LoopbackSource {
    fn request_publish(&self, text: String) {
        if self.sender.send(text).is_err() {
            warn!("Loopback source stopped, dropping publish request");
        }
    }
}

/// Deliver every accepted publish request back through the hub.
///
/// Returns when every [`LoopbackSource`] handle has been dropped.
pub async fn run_loopback(mut source: LoopbackReceiver, hub: Arc<Hub>) {
    info!(display_name = %source.display_name, "Loopback source started");
    while let Some(text) = source.receiver.recv().await {
        let message = ChatMessage::new(source.display_name.clone(), text, Utc::now());
        match hub.deliver(message).await {
            Ok(recipients) => debug!(recipients, "Loopback message delivered"),
            Err(e) => warn!("Loopback message rejected: {}", e),
        }
    }
    info!("Loopback source stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::frame::{Frame, MessageType};
    use crate::message::message_triples;

    /// Records publish requests instead of forwarding them anywhere.
    #[derive(Default)]
    pub(crate) struct RecordingSource {
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl RecordingSource {
        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl EventSource for RecordingSource {
        fn request_publish(&self, text: String) {
            self.requests.lock().unwrap().push(text);
        }
    }

    #[tokio::test]
    async fn loopback_delivers_to_registered_sessions() {
        let (source, receiver) = LoopbackSource::new("web");
        let hub = Arc::new(Hub::new(Arc::new(source), "Hello!", 0).unwrap());
        let loopback = tokio::spawn(run_loopback(receiver, hub.clone()));

        let (tx, mut rx) = mpsc::channel(hub.queue_capacity());
        let id = crate::hub::SessionId::new();
        hub.register(id, tx).await;
        let _hello = rx.recv().await.unwrap();

        hub.request_send("ping".to_string());

        let bytes = rx.recv().await.unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.message_type(), Some(MessageType::ReceivedMessage));
        let triples = message_triples(&frame);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].0, "web");
        assert_eq!(triples[0].1, "ping");

        drop(hub);
        loopback.abort();
    }

    #[test]
    fn request_after_receiver_dropped_does_not_panic() {
        let (source, receiver) = LoopbackSource::new("web");
        drop(receiver);
        source.request_publish("lost".to_string());
    }
}
