//! Broadcast Hub
//!
//! Tracks connected sessions and fans delivered chat messages out to them.
//!
//! Each session registers a bounded outbound channel. Broadcasts are encoded
//! once and the same [`Bytes`] buffer is pushed onto every channel with
//! `try_send`, so all clients see byte-identical frames and a slow socket
//! never holds up the hub. A session whose queue is full has stopped keeping
//! up and is dropped from the registry. Registry changes, history updates and
//! the push itself happen under one lock, which gives every session a clean
//! cut: a message is either in the history batch it received on connect or
//! arrives later as a live frame, never both and never half of one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::frame::{Frame, MessageType};
use crate::history::MessageHistory;
use crate::message::{ChatMessage, frame_for_messages};
use crate::source::EventSource;

/// Frames a session may have queued before it is considered stalled.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Smallest usable queue: room for the greeting and the history batch.
pub const MIN_QUEUE_CAPACITY: usize = 2;

/// Channel a session drains to its socket. Carries fully encoded frames.
pub type Outbound = mpsc::Sender<Bytes>;

/// Unique ID for one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Registry {
    sessions: HashMap<SessionId, Outbound>,
    history: MessageHistory,
}

pub struct Hub {
    registry: Mutex<Registry>,
    source: Arc<dyn EventSource>,
    hello: Bytes,
    queue_capacity: usize,
}

impl Hub {
    /// Fails if `greeting` does not fit in a single frame field.
    pub fn new(
        source: Arc<dyn EventSource>,
        greeting: &str,
        history_size: usize,
    ) -> Result<Self, ProtocolError> {
        let hello = Frame::new(MessageType::Hello, vec![greeting.to_string()])?.encode();
        let history = MessageHistory::new(history_size);
        debug!(history_size = history.capacity(), "Hub created");
        Ok(Self {
            registry: Mutex::new(Registry {
                sessions: HashMap::new(),
                history,
            }),
            source,
            hello,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        })
    }

    /// Set the per-session outbound queue size, at least [`MIN_QUEUE_CAPACITY`].
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(MIN_QUEUE_CAPACITY);
        self
    }

    /// Capacity sessions should use for their outbound channel.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Add a session and queue its greeting, then the history batch if any.
    ///
    /// Registering an ID that is already present does nothing. A session
    /// whose channel cannot take the greeting is not added.
    pub async fn register(&self, id: SessionId, outbound: Outbound) {
        let mut registry = self.registry.lock().await;
        if registry.sessions.contains_key(&id) {
            debug!(session_id = %id, "Session already registered");
            return;
        }

        if let Err(e) = outbound.try_send(self.hello.clone()) {
            warn!(session_id = %id, "Session cannot take greeting, not registering: {}", e);
            return;
        }

        if !registry.history.is_empty() {
            match frame_for_messages(MessageType::MessageHistory, &registry.history.snapshot()) {
                Ok(frame) => {
                    if let Err(e) = outbound.try_send(frame.encode()) {
                        warn!(session_id = %id, "Session cannot take history, not registering: {}", e);
                        return;
                    }
                }
                Err(e) => warn!(session_id = %id, "Failed to encode history: {}", e),
            }
        }

        registry.sessions.insert(id, outbound);
        info!(
            session_id = %id,
            sessions = registry.sessions.len(),
            "Session registered"
        );
    }

    /// Remove a session. Returns whether it was registered.
    pub async fn deregister(&self, id: &SessionId) -> bool {
        let mut registry = self.registry.lock().await;
        let removed = registry.sessions.remove(id).is_some();
        if removed {
            info!(
                session_id = %id,
                sessions = registry.sessions.len(),
                "Session deregistered"
            );
        }
        removed
    }

    /// Hand a publish request to the upstream source. Fire-and-forget.
    pub fn request_send(&self, text: String) {
        debug!(len = text.len(), "Forwarding publish request");
        self.source.request_publish(text);
    }

    /// Broadcast a message accepted upstream to every registered session.
    ///
    /// The frame is built before any session is touched, so an oversized
    /// message fails without reaching anyone. Sessions whose queue is full or
    /// closed are dropped from the registry; dropping the hub's sender lets
    /// their writer finish and close the socket. Returns the number of
    /// sessions the frame was queued for.
    pub async fn deliver(&self, message: ChatMessage) -> Result<usize, ProtocolError> {
        let bytes =
            frame_for_messages(MessageType::ReceivedMessage, std::slice::from_ref(&message))?
                .encode();

        let mut registry = self.registry.lock().await;
        registry.history.push(message);

        let mut dropped = Vec::new();
        for (id, outbound) in &registry.sessions {
            match outbound.try_send(bytes.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %id, capacity = self.queue_capacity, "Session queue full, disconnecting slow client");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %id, "Pruned closed session during broadcast");
                    dropped.push(*id);
                }
            }
        }
        for id in &dropped {
            registry.sessions.remove(id);
        }

        let recipients = registry.sessions.len();
        debug!(recipients, bytes = bytes.len(), "Broadcast message");
        Ok(recipients)
    }

    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.sessions.len()
    }
}
