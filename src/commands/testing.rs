//! Test bed for actions and the router

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use super::context::ActionContext;
use super::event::{MessageEvent, ReactionEvent};
use super::handlers::standard_registry;
use super::router::{AccessPolicy, DispatchRouter};
use crate::core::ManualClock;
use crate::database::{Channel, Role};
use crate::delivery::testing::{test_messenger, RecordingTransport};

pub struct TestBed {
    pub ctx: ActionContext,
    pub transport: Arc<RecordingTransport>,
    pub clock: ManualClock,
    pub channel: Channel,
    pub now: DateTime<Utc>,
}

impl TestBed {
    pub async fn new() -> Self {
        Self::with_role(Role::User).await
    }

    /// One known user `user-1` talking in `dm-1`, on a Wednesday at 10:00 UTC
    pub async fn with_role(role: Role) -> Self {
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 10, 0, 0).unwrap();
        let (messenger, transport, database, clock) = test_messenger(now).await;
        let channel = database.add_channel("dm-1", "user-1", role, now).await.unwrap();
        let registry = Arc::new(standard_registry().unwrap());
        let ctx = ActionContext::new(
            database,
            messenger,
            Arc::new(clock.clone()),
            "https://remind.example",
            registry,
        );
        TestBed {
            ctx,
            transport,
            clock,
            channel,
            now,
        }
    }

    pub fn router(&self) -> DispatchRouter {
        self.router_with(AccessPolicy {
            bot_user: "bot".to_string(),
            admin_users: Vec::new(),
            allow_new_users: false,
        })
    }

    pub fn router_with(&self, policy: AccessPolicy) -> DispatchRouter {
        DispatchRouter::new(self.ctx.clone(), policy)
    }

    pub fn message(&self, event_id: &str, body: &str) -> MessageEvent {
        MessageEvent {
            event_id: event_id.to_string(),
            sender: self.channel.user_identifier.clone(),
            channel_identifier: self.channel.channel_identifier.clone(),
            body: body.to_string(),
            body_html: None,
            timestamp: self.now,
            reply_to: None,
            is_direct: true,
        }
    }

    pub fn reaction(&self, event_id: &str, relates_to: &str, key: &str) -> ReactionEvent {
        ReactionEvent {
            event_id: event_id.to_string(),
            sender: self.channel.user_identifier.clone(),
            channel_identifier: self.channel.channel_identifier.clone(),
            key: key.to_string(),
            relates_to: relates_to.to_string(),
            timestamp: self.now,
        }
    }
}
