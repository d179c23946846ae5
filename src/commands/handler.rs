//! Action traits the dispatch router chooses among
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 2.0.0: Split into message, reply and reaction actions
//! - 1.0.0: Initial implementation for modular command handling

use anyhow::Result;
use async_trait::async_trait;

use super::context::ActionContext;
use super::event::{MessageEvent, ReactionEvent};
use crate::database::{Channel, Message, MessageType};

/// A command recognised by matching the whole message text
///
/// # Example
///
/// ```ignore
/// pub struct PingAction;
///
/// #[async_trait]
/// impl Action for PingAction {
///     fn name(&self) -> &'static str { "Ping" }
///     fn examples(&self) -> &'static [&'static str] { &["ping"] }
///     fn pattern(&self) -> &'static str { "(?i)^ping$" }
///
///     async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
///         ctx.reply(channel, &event.event_id, "pong", MessageType::DoNotSave);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync {
    /// Human readable name shown in the command listing
    fn name(&self) -> &'static str;

    fn examples(&self) -> &'static [&'static str];

    /// Regex matched against the lower-cased message text
    fn pattern(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &MessageEvent,
        channel: &Channel,
    ) -> Result<()>;
}

/// A command recognised in a reply to one of the recorded messages
#[async_trait]
pub trait ReplyAction: Send + Sync {
    fn name(&self) -> &'static str;

    fn examples(&self) -> &'static [&'static str];

    fn pattern(&self) -> &'static str;

    /// Types of the replied-to message this action applies to
    fn reply_to_types(&self) -> &'static [MessageType];

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &MessageEvent,
        channel: &Channel,
        replied_to: &Message,
    ) -> Result<()>;
}

/// A reaction handler, keyed by emoji
///
/// The channel may be unknown when the reacting user has no channel with the bot;
/// actions that need to answer return an error in that case.
#[async_trait]
pub trait ReactionAction: Send + Sync {
    fn name(&self) -> &'static str;

    fn keys(&self) -> &[&'static str];

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &ReactionEvent,
        channel: Option<&Channel>,
        target: &Message,
    ) -> Result<()>;
}

/// Which recorded messages a reaction action listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionScope {
    Type(MessageType),
    AllTypes,
}

impl ReactionScope {
    pub fn covers(&self, message_type: MessageType) -> bool {
        match self {
            ReactionScope::Type(t) => *t == message_type,
            ReactionScope::AllTypes => true,
        }
    }

    /// Label used in the command listing
    pub fn label(&self) -> &'static str {
        match self {
            ReactionScope::Type(MessageType::ReminderRequest) => "Reminder Requests",
            ReactionScope::Type(MessageType::ReminderSuccess) => "Reminder Confirmations",
            ReactionScope::Type(MessageType::Reminder) => "Reminders",
            ReactionScope::Type(MessageType::DailyReminder) => "Daily Reminder Messages",
            ReactionScope::Type(_) => "Other Messages",
            ReactionScope::AllTypes => "All Messages",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn Action, _: &dyn ReplyAction, _: &dyn ReactionAction) {}

    #[test]
    fn test_reaction_scope_covers() {
        assert!(ReactionScope::Type(MessageType::Reminder).covers(MessageType::Reminder));
        assert!(!ReactionScope::Type(MessageType::Reminder).covers(MessageType::ReminderRequest));
        assert!(ReactionScope::AllTypes.covers(MessageType::DailyReminder));
    }
}
