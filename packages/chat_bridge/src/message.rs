//! Chat messages and their frame representation.

use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::frame::{Frame, MessageType};

/// Fields each message occupies in a `ReceivedMessage` or `MessageHistory` frame.
pub const FIELDS_PER_MESSAGE: usize = 3;

/// A chat event as accepted by the upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: Option<String>,
    pub display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        display_name: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            text: Some(text.into()),
            display_name: Some(display_name.into()),
            timestamp,
        }
    }

    /// Whole seconds since the Unix epoch, floored.
    pub fn unix_seconds(&self) -> i64 {
        // chrono keeps sub-second nanos non-negative, so this floors for
        // pre-epoch instants too.
        self.timestamp.timestamp()
    }

    /// `[display name, text, unix seconds]`, with absent values as empty strings.
    pub fn to_fields(&self) -> [String; FIELDS_PER_MESSAGE] {
        [
            self.display_name.clone().unwrap_or_default(),
            self.text.clone().unwrap_or_default(),
            self.unix_seconds().to_string(),
        ]
    }
}

/// Pack messages into one frame, one triple per message, in order.
pub fn frame_for_messages(
    kind: MessageType,
    messages: &[ChatMessage],
) -> Result<Frame, ProtocolError> {
    let mut fields = Vec::with_capacity(messages.len() * FIELDS_PER_MESSAGE);
    for message in messages {
        fields.extend(message.to_fields());
    }
    Frame::new(kind, fields)
}

/// Inverse of [`frame_for_messages`] for clients and tests.
///
/// Returns `(display name, text, seconds)` triples; a trailing partial triple
/// is dropped.
pub fn message_triples(frame: &Frame) -> Vec<(&str, &str, &str)> {
    frame
        .fields()
        .chunks_exact(FIELDS_PER_MESSAGE)
        .map(|c| (c[0].as_str(), c[1].as_str(), c[2].as_str()))
        .collect()
}
