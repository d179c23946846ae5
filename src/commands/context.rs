//! Shared context for action handlers
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 2.0.0: Messenger, clock and action registry for chat actions
//! - 1.0.0: Initial implementation with core shared state

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;

use super::event::MessageEvent;
use super::registry::ActionRegistry;
use crate::core::Clock;
use crate::database::{Channel, Database, Message, MessageType, NewMessage};
use crate::delivery::{DeliveryTicket, Messenger, OutgoingMessage, Record};

/// Shared services for all actions
///
/// Contains:
/// - Database for channels, reminders and recorded messages
/// - Messenger for everything that goes out
/// - Clock, replaced by a manual clock in tests
/// - The action registry, for the command listing
#[derive(Clone)]
pub struct ActionContext {
    pub database: Database,
    pub messenger: Messenger,
    pub clock: Arc<dyn Clock>,
    /// Prefix of calendar links
    pub base_url: String,
    pub registry: Arc<ActionRegistry>,
}

impl ActionContext {
    pub fn new(
        database: Database,
        messenger: Messenger,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
        registry: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            database,
            messenger,
            clock,
            base_url: base_url.into(),
            registry,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Queue a plain-text reply to `event_id` and record it as `message_type`
    pub fn reply(
        &self,
        channel: &Channel,
        event_id: &str,
        body: &str,
        message_type: MessageType,
    ) -> DeliveryTicket {
        self.messenger.send_and_store_async(
            OutgoingMessage::plain(&channel.channel_identifier, body).in_reply_to(event_id),
            Record::new(channel, message_type),
        )
    }

    /// Queue a formatted reply built by [`crate::core::Formatter::build`]
    pub fn reply_formatted(
        &self,
        channel: &Channel,
        event_id: &str,
        (body, body_html): (String, String),
        record: Record,
    ) -> DeliveryTicket {
        self.messenger.send_and_store_async(
            OutgoingMessage::formatted(&channel.channel_identifier, body, body_html)
                .in_reply_to(event_id),
            record,
        )
    }

    /// Queue a message that is not a reply
    pub fn notify(&self, channel: &Channel, body: &str, record: Record) -> DeliveryTicket {
        self.messenger.send_and_store_async(
            OutgoingMessage::plain(&channel.channel_identifier, body),
            record,
        )
    }

    /// Record an inbound message so replies and reactions to it can be resolved
    pub async fn record_event(
        &self,
        event: &MessageEvent,
        channel: &Channel,
        reminder_id: Option<i64>,
        message_type: MessageType,
    ) -> Result<Message> {
        self.database
            .add_message(NewMessage {
                external_id: event.event_id.clone(),
                channel_id: channel.id,
                reminder_id,
                body: event.body.clone(),
                body_html: event.body_html.clone().unwrap_or_else(|| event.body.clone()),
                message_type,
                timestamp: event.timestamp,
            })
            .await
    }

    /// Same as [`ActionContext::record_event`] but only logs failures
    pub async fn try_record_event(
        &self,
        event: &MessageEvent,
        channel: &Channel,
        reminder_id: Option<i64>,
        message_type: MessageType,
    ) {
        if let Err(e) = self
            .record_event(event, channel, reminder_id, message_type)
            .await
        {
            warn!("Failed to record message {}: {e}", event.event_id);
        }
    }

    /// Queue redactions for recorded messages
    pub fn redact_messages(&self, channel: &Channel, messages: &[Message]) {
        for message in messages {
            self.messenger
                .redact_async(&channel.channel_identifier, &message.external_id);
        }
    }
}
