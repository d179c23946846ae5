//! # Dispatch Router
//!
//! Decides which single handler processes an inbound message or reaction.
//!
//! Messages: replies to recorded messages go to the first matching reply action (or move
//! the attached reminder), then the first matching action, and everything else becomes a
//! new reminder. Reactions: every action registered for the target's type and emoji is
//! tried in order until one succeeds.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Initial message and reaction dispatch

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use super::context::ActionContext;
use super::event::{MessageEvent, ReactionEvent};
use super::handlers::{create_reminder, reschedule_from_reply};
use crate::database::{Channel, MessageType, Role};
use crate::delivery::{OutgoingMessage, Record, RetryPolicy};

const WRONG_CHANNEL_NOTICE: &str = "Hey, this is not our usual messaging channel ;)";

/// Who may talk to the bot
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// The bot's own user identifier, whose events are ignored
    pub bot_user: String,
    pub admin_users: Vec<String>,
    /// Onboard unknown users writing in a direct conversation
    pub allow_new_users: bool,
}

impl AccessPolicy {
    fn is_admin(&self, user: &str) -> bool {
        self.admin_users.iter().any(|u| u == user)
    }
}

#[derive(Clone)]
pub struct DispatchRouter {
    ctx: ActionContext,
    policy: AccessPolicy,
    /// Events older than this are replays and ignored
    start_time: DateTime<Utc>,
}

impl DispatchRouter {
    pub fn new(ctx: ActionContext, policy: AccessPolicy) -> Self {
        let start_time = ctx.now();
        Self {
            ctx,
            policy,
            start_time,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }

    fn ignored(&self, sender: &str, timestamp: DateTime<Utc>) -> bool {
        sender == self.policy.bot_user || timestamp < self.start_time
    }

    /// Handle one inbound message; errors are logged, never returned
    pub async fn handle_message(&self, event: &MessageEvent) {
        if self.ignored(&event.sender, event.timestamp) {
            return;
        }
        debug!(
            "New message {} from {} in {}",
            event.event_id, event.sender, event.channel_identifier
        );

        if let Err(e) = self.dispatch_message(event).await {
            error!("Failed to handle message {}: {e}", event.event_id);
        }
    }

    async fn dispatch_message(&self, event: &MessageEvent) -> Result<()> {
        let Some(channel) = self.resolve_channel(event).await? else {
            return Ok(());
        };
        let text = event.text();

        if let Some(replied_id) = event.replied_event() {
            if let Some(replied_to) = self.ctx.database.message_by_external_id(replied_id).await? {
                if let Some(action) = self.ctx.registry.match_reply(replied_to.message_type, &text) {
                    debug!("Reply {} matched {}", event.event_id, action.name());
                    if let Err(e) = action.handle(&self.ctx, event, &channel, &replied_to).await {
                        warn!("Reply action {} failed: {e}", action.name());
                    }
                    return Ok(());
                }

                if replied_to.reminder_id.is_some() && replied_to.message_type.carries_reminder() {
                    if let Err(e) = reschedule_from_reply(&self.ctx, event, &channel, &replied_to).await {
                        warn!("Could not reschedule from reply {}: {e}", event.event_id);
                    }
                    return Ok(());
                }
            } else {
                debug!("Message {} replies to an unknown message", event.event_id);
            }
        }

        if let Some(action) = self.ctx.registry.match_action(&text) {
            debug!("Message {} matched {}", event.event_id, action.name());
            if let Err(e) = action.handle(&self.ctx, event, &channel).await {
                warn!("Action {} failed: {e}", action.name());
            }
            return Ok(());
        }

        create_reminder(&self.ctx, event, &channel).await
    }

    /// Channel of the sender, onboarding or redirecting unknown senders
    async fn resolve_channel(&self, event: &MessageEvent) -> Result<Option<Channel>> {
        let database = &self.ctx.database;
        if let Some(channel) = database
            .get_channel_by_user_and_identifier(&event.sender, &event.channel_identifier)
            .await?
        {
            return Ok(Some(channel));
        }

        if !database.get_channels_by_user(&event.sender).await?.is_empty() {
            info!("User {} messaged us in a channel we do not know", event.sender);
            let notice = OutgoingMessage::plain(&event.channel_identifier, WRONG_CHANNEL_NOTICE)
                .in_reply_to(&event.event_id);
            if let Err(e) = self.ctx.messenger.send(notice, RetryPolicy::SYNC).await {
                warn!("Could not send wrong channel notice: {e}");
            }
            return Ok(None);
        }

        let is_admin = self.policy.is_admin(&event.sender);
        if !event.is_direct || !(self.policy.allow_new_users || is_admin) {
            debug!("We do not know user {}", event.sender);
            return Ok(None);
        }

        let role = if is_admin { Role::Admin } else { Role::User };
        let channel = database
            .add_channel(&event.channel_identifier, &event.sender, role, self.ctx.now())
            .await?;
        info!("Onboarded {} as {role} (channel {})", event.sender, channel.id);
        self.ctx.notify(
            &channel,
            "Hey, nice to meet you! Message me \"commands\" to see what I can do for you.",
            Record::new(&channel, MessageType::DoNotSave),
        );
        Ok(Some(channel))
    }

    /// Handle one inbound reaction; errors are logged, never returned
    pub async fn handle_reaction(&self, event: &ReactionEvent) {
        if self.ignored(&event.sender, event.timestamp) {
            return;
        }
        debug!(
            "New reaction {} from {} on {}",
            event.key, event.sender, event.relates_to
        );

        if let Err(e) = self.dispatch_reaction(event).await {
            error!("Failed to handle reaction {}: {e}", event.event_id);
        }
    }

    async fn dispatch_reaction(&self, event: &ReactionEvent) -> Result<()> {
        let database = &self.ctx.database;
        let channel = database
            .get_channel_by_user_and_identifier(&event.sender, &event.channel_identifier)
            .await?;
        if channel.is_none() {
            debug!("Reaction from {} in a channel we do not know", event.sender);
        }

        if event.relates_to.is_empty() {
            return Ok(());
        }
        let Some(target) = database.message_by_external_id(&event.relates_to).await? else {
            debug!("Do not know the message related to reaction {}", event.event_id);
            return Ok(());
        };

        for action in self.ctx.registry.reaction_candidates(target.message_type, &event.key) {
            match action.handle(&self.ctx, event, channel.as_ref(), &target).await {
                Ok(()) => {
                    debug!("Reaction {} handled by {}", event.event_id, action.name());
                    return Ok(());
                }
                Err(e) => info!("Reaction action {} did not apply: {e}", action.name()),
            }
        }

        debug!("Nothing handled reaction {}", event.event_id);
        Ok(())
    }
}
