//! # Discord Transport
//!
//! Serenity-backed implementation of the delivery [`Transport`]. Channel, message and
//! user identifiers travel through the rest of the crate as decimal snowflake strings.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Send, react, delete and direct channels over the Discord REST API

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serenity::http::{Http, HttpError};
use serenity::model::channel::{Message, Reaction, ReactionType};
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::sync::Arc;

use crate::commands::{MessageEvent, ReactionEvent};
use crate::delivery::{OutgoingMessage, Transport, TransportError};

/// Discord rejects message content above this many characters
pub const MAX_MESSAGE_LENGTH: usize = 2000;

pub struct DiscordTransport {
    http: Arc<Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<Http>) -> Self {
        DiscordTransport { http }
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, TransportError> {
        let channel = ChannelId(parse_id(&message.channel_identifier)?);
        let reply_to = match &message.reply_to {
            Some(event_id) => Some(MessageId(parse_id(event_id)?)),
            None => None,
        };
        let content = truncate(&message.body);

        let sent = channel
            .send_message(&*self.http, |m| {
                m.content(&content);
                if let Some(reply) = reply_to {
                    m.reference_message((channel, reply));
                }
                m
            })
            .await
            .map_err(classify)?;
        Ok(sent.id.0.to_string())
    }

    async fn send_reaction(
        &self,
        channel_identifier: &str,
        event_id: &str,
        key: &str,
    ) -> Result<(), TransportError> {
        let channel = ChannelId(parse_id(channel_identifier)?);
        let message = MessageId(parse_id(event_id)?);
        channel
            .create_reaction(&*self.http, message, ReactionType::Unicode(key.to_string()))
            .await
            .map_err(classify)
    }

    async fn redact(&self, channel_identifier: &str, event_id: &str) -> Result<(), TransportError> {
        let channel = ChannelId(parse_id(channel_identifier)?);
        let message = MessageId(parse_id(event_id)?);
        channel
            .delete_message(&*self.http, message)
            .await
            .map_err(classify)
    }

    async fn open_direct_channel(&self, user_identifier: &str) -> Result<String, TransportError> {
        let user = UserId(parse_id(user_identifier)?);
        let dm = user
            .create_dm_channel(&*self.http)
            .await
            .map_err(classify)?;
        Ok(dm.id.0.to_string())
    }

    fn mention(&self, user_identifier: &str) -> String {
        format!("<@{user_identifier}>")
    }
}

/// Map a gateway message to the router's event
pub fn message_event(message: &Message) -> MessageEvent {
    let timestamp = Utc
        .timestamp_opt(message.timestamp.unix_timestamp(), 0)
        .single()
        .unwrap_or_else(Utc::now);
    MessageEvent {
        event_id: message.id.0.to_string(),
        sender: message.author.id.0.to_string(),
        channel_identifier: message.channel_id.0.to_string(),
        body: message.content.clone(),
        body_html: None,
        timestamp,
        reply_to: message
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.0.to_string()),
        is_direct: message.guild_id.is_none(),
    }
}

/// Map a gateway reaction; custom guild emoji and anonymous reactions yield nothing.
/// Discord reactions carry no id or time of their own, so `received_at` stands in.
pub fn reaction_event(reaction: &Reaction, received_at: DateTime<Utc>) -> Option<ReactionEvent> {
    let ReactionType::Unicode(key) = &reaction.emoji else {
        return None;
    };
    let user = reaction.user_id?;
    Some(ReactionEvent {
        event_id: format!("{}:{}:{key}", reaction.message_id.0, user.0),
        sender: user.0.to_string(),
        channel_identifier: reaction.channel_id.0.to_string(),
        key: key.clone(),
        relates_to: reaction.message_id.0.to_string(),
        timestamp: received_at,
    })
}

/// Parse a snowflake; anything else can never succeed on retry
fn parse_id(raw: &str) -> Result<u64, TransportError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| TransportError::Fatal(format!("not a Discord id: {raw}")))
}

/// Cut `body` to the message length limit on a character boundary
fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_MESSAGE_LENGTH {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_MESSAGE_LENGTH - 1).collect();
    cut.push('…');
    cut
}

fn classify(error: serenity::Error) -> TransportError {
    match &error {
        serenity::Error::Http(http_error) => match http_error.as_ref() {
            HttpError::UnsuccessfulRequest(response) => {
                classify_status(response.status_code.as_u16(), error.to_string())
            }
            _ => TransportError::Transient(error.to_string()),
        },
        serenity::Error::Json(_) | serenity::Error::Model(_) => {
            TransportError::Fatal(error.to_string())
        }
        _ => TransportError::Transient(error.to_string()),
    }
}

fn classify_status(status: u16, detail: String) -> TransportError {
    match status {
        429 => TransportError::RateLimited { retry_after: None },
        400 | 401 | 403 | 404 | 405 | 413 => TransportError::Fatal(detail),
        _ => TransportError::Transient(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("80351110224678912").unwrap(), 80351110224678912);
        assert!(matches!(parse_id("dm-1"), Err(TransportError::Fatal(_))));
    }

    #[test]
    fn test_truncate_long_body() {
        assert_eq!(truncate("short"), "short");

        let long = "ä".repeat(MAX_MESSAGE_LENGTH + 10);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_LENGTH);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(429, String::new()),
            TransportError::RateLimited { retry_after: None }
        );
        assert!(matches!(classify_status(403, "forbidden".into()), TransportError::Fatal(_)));
        assert!(matches!(classify_status(404, "gone".into()), TransportError::Fatal(_)));
        assert!(matches!(classify_status(502, "bad gateway".into()), TransportError::Transient(_)));
    }

    #[test]
    fn test_mention() {
        let transport = DiscordTransport::new(Arc::new(Http::new("token")));
        assert_eq!(transport.mention("42"), "<@42>");
    }
}
