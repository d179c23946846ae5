//! Inbound events as the router sees them, independent of the chat transport

use chrono::{DateTime, Utc};

use crate::core::strip_reply;

/// A text message somebody sent to the bot
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Transport event id of this message
    pub event_id: String,
    pub sender: String,
    pub channel_identifier: String,
    pub body: String,
    pub body_html: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Event id of the message this one replies to
    pub reply_to: Option<String>,
    /// Sent in a one-to-one conversation with the bot
    pub is_direct: bool,
}

impl MessageEvent {
    /// Body without quoted reply lines, trimmed
    pub fn text(&self) -> String {
        strip_reply(&self.body)
    }

    /// Replied-to event id, if it looks like a real one
    pub fn replied_event(&self) -> Option<&str> {
        self.reply_to.as_deref().filter(|id| id.len() >= 2)
    }
}

/// An emoji reaction somebody put on a message
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub event_id: String,
    pub sender: String,
    pub channel_identifier: String,
    /// The emoji
    pub key: String,
    /// Event id of the message the reaction is attached to
    pub relates_to: String,
    pub timestamp: DateTime<Utc>,
}
