use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// In-memory messages beyond this count are dropped oldest-first. Storage
/// keeps the full log.
pub const CHAT_RETENTION: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub user_name: String,
    pub message: String,
    /// Kept for persistence and moderation, never sent to clients.
    #[serde(skip_serializing)]
    pub socket_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        user_name: Option<&str>,
        message: String,
        socket_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let user_name = match user_name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => "Anonymous".to_string(),
        };
        ChatMessage {
            user_name,
            message,
            socket_id: socket_id.to_string(),
            timestamp: now,
        }
    }
}

/// One chat shared by every connection, kept in arrival order with a
/// bounded in-memory window.
#[derive(Default)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.len() == CHAT_RETENTION {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Loads persisted history at startup, oldest first.
    pub fn absorb(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages.into();
        while self.messages.len() > CHAT_RETENTION {
            self.messages.pop_front();
        }
    }

    /// The `limit` most recent messages, oldest of them first, ready to
    /// replay to a client that just subscribed.
    pub fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }
}
