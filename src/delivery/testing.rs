//! In-memory transport double for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::messenger::Messenger;
use super::rate_limit::RateLimitGate;
use super::retrier::DeliveryRetrier;
use super::transport::{OutgoingMessage, Transport, TransportError};
use crate::core::ManualClock;
use crate::database::Database;

/// Records everything sent through it and fails on demand
#[derive(Default)]
pub struct RecordingTransport {
    next_event: AtomicU64,
    messages: Mutex<Vec<(String, OutgoingMessage)>>,
    reactions: Mutex<Vec<(String, String, String)>>,
    redactions: Mutex<Vec<(String, String)>>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next transport call fails with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Sent messages with the event id they got
    pub fn messages(&self) -> Vec<(String, OutgoingMessage)> {
        self.messages.lock().unwrap().clone()
    }

    /// `(channel, event, key)` triples
    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn redactions(&self) -> Vec<(String, String)> {
        self.redactions.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
        self.reactions.lock().unwrap().clear();
        self.redactions.lock().unwrap().clear();
    }

    fn scripted_failure(&self) -> Result<(), TransportError> {
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, TransportError> {
        self.scripted_failure()?;
        let event_id = format!("$evt{}", self.next_event.fetch_add(1, Ordering::SeqCst));
        self.messages
            .lock()
            .unwrap()
            .push((event_id.clone(), message.clone()));
        Ok(event_id)
    }

    async fn send_reaction(
        &self,
        channel_identifier: &str,
        event_id: &str,
        key: &str,
    ) -> Result<(), TransportError> {
        self.scripted_failure()?;
        self.reactions.lock().unwrap().push((
            channel_identifier.to_string(),
            event_id.to_string(),
            key.to_string(),
        ));
        Ok(())
    }

    async fn redact(&self, channel_identifier: &str, event_id: &str) -> Result<(), TransportError> {
        self.scripted_failure()?;
        self.redactions
            .lock()
            .unwrap()
            .push((channel_identifier.to_string(), event_id.to_string()));
        Ok(())
    }

    async fn open_direct_channel(&self, user_identifier: &str) -> Result<String, TransportError> {
        self.scripted_failure()?;
        Ok(format!("dm-{user_identifier}"))
    }

    fn mention(&self, user_identifier: &str) -> String {
        format!("@{user_identifier}")
    }
}

/// Messenger over a fresh in-memory database, a recording transport and a manual clock
pub async fn test_messenger(
    now: DateTime<Utc>,
) -> (Messenger, Arc<RecordingTransport>, Database, ManualClock) {
    let clock = ManualClock::new(now);
    let database = Database::new(":memory:").await.unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let gate = Arc::new(RateLimitGate::new(Arc::new(clock.clone())));
    let retrier =
        DeliveryRetrier::new(gate, 4).with_poll_interval(Duration::from_millis(10));
    let messenger = Messenger::new(
        transport.clone(),
        retrier,
        database.clone(),
        Arc::new(clock.clone()),
    );
    (messenger, transport, database, clock)
}

/// Wait until the background workers produced `count` messages
pub async fn wait_for_messages(transport: &RecordingTransport, count: usize) {
    for _ in 0..200 {
        if transport.messages().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the background workers produced `count` reactions
pub async fn wait_for_reactions(transport: &RecordingTransport, count: usize) {
    for _ in 0..200 {
        if transport.reactions().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the background workers produced `count` redactions
pub async fn wait_for_redactions(transport: &RecordingTransport, count: usize) {
    for _ in 0..200 {
        if transport.redactions().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
