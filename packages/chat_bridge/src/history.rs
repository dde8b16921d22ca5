//! Bounded ring buffer of recently delivered messages.
//!
//! New sessions receive the buffer's contents as one `MessageHistory` frame
//! right after the greeting, so a browser that connects mid-conversation sees
//! the recent backlog.

use std::collections::VecDeque;

use crate::message::{ChatMessage, FIELDS_PER_MESSAGE};

/// Most messages a single history frame can carry.
pub const MAX_HISTORY_ENTRIES: usize = crate::frame::MAX_FIELDS / FIELDS_PER_MESSAGE;

pub struct MessageHistory {
    buffer: VecDeque<ChatMessage>,
    max_entries: usize,
}

impl MessageHistory {
    /// A capacity of 0 disables history.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.min(MAX_HISTORY_ENTRIES);
        Self {
            buffer: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.max_entries == 0 {
            return;
        }
        while self.buffer.len() >= self.max_entries {
            self.buffer.pop_front();
        }
        self.buffer.push_back(message);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}
