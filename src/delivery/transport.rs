//! Outbound transport contract
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Initial send/react/redact contract with classified errors

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors as classified by the transport adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Temporary send suspension; retried without using up the retry budget
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Auth failures, malformed requests, unsupported protocol versions, unknown tokens
    #[error("fatal transport error: {0}")]
    Fatal(String),

    /// Anything else, presumed temporary
    #[error("transport error: {0}")]
    Transient(String),
}

/// An outbound text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel_identifier: String,
    pub body: String,
    pub body_html: String,
    /// Event this message replies to, if any
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    pub fn plain(channel_identifier: &str, body: &str) -> Self {
        OutgoingMessage {
            channel_identifier: channel_identifier.to_string(),
            body: body.to_string(),
            body_html: body.to_string(),
            reply_to: None,
        }
    }

    pub fn formatted(channel_identifier: &str, body: String, body_html: String) -> Self {
        OutgoingMessage {
            channel_identifier: channel_identifier.to_string(),
            body,
            body_html,
            reply_to: None,
        }
    }

    pub fn in_reply_to(mut self, event_id: &str) -> Self {
        self.reply_to = Some(event_id.to_string());
        self
    }
}

/// Chat protocol capability used by the delivery layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message and return the transport's event id for it
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, TransportError>;

    async fn send_reaction(
        &self,
        channel_identifier: &str,
        event_id: &str,
        key: &str,
    ) -> Result<(), TransportError>;

    async fn redact(&self, channel_identifier: &str, event_id: &str) -> Result<(), TransportError>;

    /// Open (or reuse) a direct conversation with a user and return its channel identifier
    async fn open_direct_channel(&self, user_identifier: &str) -> Result<String, TransportError>;

    /// How a user is addressed inside a message body
    fn mention(&self, user_identifier: &str) -> String {
        user_identifier.to_string()
    }
}
