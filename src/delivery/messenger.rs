//! Outbound facade used by actions and the scheduler
//!
//! Combines the transport, the retrier and the message store: sends that need their
//! transport event id recorded go through the synchronous path, everything else is queued
//! on the background workers.

use anyhow::Result;
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::retrier::{DeliveryError, DeliveryRetrier, DeliveryTicket, RetryPolicy};
use super::transport::{OutgoingMessage, Transport, TransportError};
use crate::core::Clock;
use crate::database::{Channel, Database, Message, MessageType, NewMessage};

type TransportFuture<T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send>>;

fn send_operation(
    transport: Arc<dyn Transport>,
    message: OutgoingMessage,
) -> impl FnMut() -> TransportFuture<String> + Send + 'static {
    let message = Arc::new(message);
    move || -> TransportFuture<String> {
        let transport = Arc::clone(&transport);
        let message = Arc::clone(&message);
        Box::pin(async move { transport.send_message(&message).await })
    }
}

fn reaction_operation(
    transport: Arc<dyn Transport>,
    channel_identifier: String,
    event_id: String,
    key: String,
) -> impl FnMut() -> TransportFuture<()> + Send + 'static {
    move || -> TransportFuture<()> {
        let transport = Arc::clone(&transport);
        let (channel, event, key) = (channel_identifier.clone(), event_id.clone(), key.clone());
        Box::pin(async move { transport.send_reaction(&channel, &event, &key).await })
    }
}

fn redact_operation(
    transport: Arc<dyn Transport>,
    channel_identifier: String,
    event_id: String,
) -> impl FnMut() -> TransportFuture<()> + Send + 'static {
    move || -> TransportFuture<()> {
        let transport = Arc::clone(&transport);
        let (channel, event) = (channel_identifier.clone(), event_id.clone());
        Box::pin(async move { transport.redact(&channel, &event).await })
    }
}

/// What to record once a message went out
#[derive(Debug, Clone)]
pub struct Record {
    pub channel_id: i64,
    pub reminder_id: Option<i64>,
    pub message_type: MessageType,
}

impl Record {
    pub fn new(channel: &Channel, message_type: MessageType) -> Self {
        Record {
            channel_id: channel.id,
            reminder_id: None,
            message_type,
        }
    }

    pub fn with_reminder(mut self, reminder_id: i64) -> Self {
        self.reminder_id = Some(reminder_id);
        self
    }
}

#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn Transport>,
    retrier: DeliveryRetrier,
    database: Database,
    clock: Arc<dyn Clock>,
}

impl Messenger {
    pub fn new(
        transport: Arc<dyn Transport>,
        retrier: DeliveryRetrier,
        database: Database,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Messenger {
            transport,
            retrier,
            database,
            clock,
        }
    }

    pub fn retrier(&self) -> &DeliveryRetrier {
        &self.retrier
    }

    pub fn mention(&self, user_identifier: &str) -> String {
        self.transport.mention(user_identifier)
    }

    /// Send and wait for the transport event id
    pub async fn send(
        &self,
        message: OutgoingMessage,
        policy: RetryPolicy,
    ) -> Result<String, DeliveryError> {
        self.retrier
            .run(policy, send_operation(Arc::clone(&self.transport), message))
            .await
    }

    pub fn send_async(&self, message: OutgoingMessage) -> DeliveryTicket {
        self.retrier.spawn(
            "message",
            RetryPolicy::MESSAGE,
            send_operation(Arc::clone(&self.transport), message),
        )
    }

    /// Send with the interactive budget and record the result.
    ///
    /// `DoNotSave` messages are sent but not recorded and yield `None`.
    pub async fn send_and_store(
        &self,
        message: OutgoingMessage,
        record: Record,
    ) -> Result<Option<Message>> {
        self.send_and_store_with(message, record, RetryPolicy::SYNC).await
    }

    pub async fn send_and_store_with(
        &self,
        message: OutgoingMessage,
        record: Record,
        policy: RetryPolicy,
    ) -> Result<Option<Message>> {
        Self::deliver_and_store(self.clone(), message, record, policy).await
    }

    /// Background variant of [`Messenger::send_and_store`] using the fire-and-forget budget
    pub fn send_and_store_async(&self, message: OutgoingMessage, record: Record) -> DeliveryTicket {
        let messenger = self.clone();
        self.retrier.submit(
            format!("{} message", record.message_type),
            async move {
                Self::deliver_and_store(messenger, message, record, RetryPolicy::MESSAGE).await?;
                Ok(())
            },
        )
    }

    async fn deliver_and_store(
        messenger: Messenger,
        message: OutgoingMessage,
        record: Record,
        policy: RetryPolicy,
    ) -> Result<Option<Message>> {
        let body = message.body.clone();
        let body_html = message.body_html.clone();
        let external_id = messenger.send(message, policy).await?;

        if record.message_type == MessageType::DoNotSave {
            return Ok(None);
        }

        let stored = messenger
            .database
            .add_message(NewMessage {
                external_id,
                channel_id: record.channel_id,
                reminder_id: record.reminder_id,
                body,
                body_html,
                message_type: record.message_type,
                timestamp: messenger.clock.now(),
            })
            .await?;
        debug!("Recorded {} message {}", stored.message_type, stored.id);
        Ok(Some(stored))
    }

    pub async fn react(
        &self,
        channel_identifier: &str,
        event_id: &str,
        key: &str,
    ) -> Result<(), DeliveryError> {
        self.retrier
            .run(
                RetryPolicy::SYNC,
                reaction_operation(
                    Arc::clone(&self.transport),
                    channel_identifier.to_string(),
                    event_id.to_string(),
                    key.to_string(),
                ),
            )
            .await
    }

    /// Queue one reaction per key on an event
    pub fn react_async(
        &self,
        channel_identifier: &str,
        event_id: &str,
        keys: &[&str],
    ) -> Vec<DeliveryTicket> {
        keys.iter()
            .map(|key| {
                self.retrier.spawn(
                    format!("reaction {key}"),
                    RetryPolicy::REACTION,
                    reaction_operation(
                        Arc::clone(&self.transport),
                        channel_identifier.to_string(),
                        event_id.to_string(),
                        key.to_string(),
                    ),
                )
            })
            .collect()
    }

    pub fn redact_async(&self, channel_identifier: &str, event_id: &str) -> DeliveryTicket {
        self.retrier.spawn(
            "redaction",
            RetryPolicy::REACTION,
            redact_operation(
                Arc::clone(&self.transport),
                channel_identifier.to_string(),
                event_id.to_string(),
            ),
        )
    }

    pub async fn open_direct_channel(&self, user_identifier: &str) -> Result<String, DeliveryError> {
        let transport = Arc::clone(&self.transport);
        let user = user_identifier.to_string();
        self.retrier
            .run(RetryPolicy::SYNC, move || {
                let transport = Arc::clone(&transport);
                let user = user.clone();
                async move { transport.open_direct_channel(&user).await }
            })
            .await
    }
}
