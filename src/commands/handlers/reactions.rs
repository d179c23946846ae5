//! Reaction actions
//!
//! Handles: ❌ delete, 1️⃣…🔟 ➕ add time, ❌ on digests, ✅ done, 🔄 reschedule
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Reaction driven reminder management

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use super::reminder::delete_with_messages;
use super::settings::DAILY_REMINDER_OFF;
use crate::commands::context::ActionContext;
use crate::commands::event::ReactionEvent;
use crate::commands::handler::ReactionAction;
use crate::core::{motivational_sentence, to_local_time};
use crate::database::{Channel, Message, MessageType, Reminder};
use crate::delivery::{OutgoingMessage, Record};

fn require_channel(channel: Option<&Channel>) -> Result<&Channel> {
    channel.ok_or_else(|| anyhow!("reaction from a channel we do not know"))
}

async fn target_reminder(
    ctx: &ActionContext,
    channel: &Channel,
    target: &Message,
) -> Result<Reminder> {
    let reminder_id = target
        .reminder_id
        .ok_or_else(|| anyhow!("message {} has no reminder", target.id))?;
    ctx.database
        .get_reminder_for_channel(channel.id, reminder_id)
        .await?
        .ok_or_else(|| anyhow!("reminder {reminder_id} is not in channel {}", channel.id))
}

/// Event to answer to: the original request if we still have it, else the reacted message
async fn request_event(ctx: &ActionContext, target: &Message) -> String {
    let Some(reminder_id) = target.reminder_id else {
        return target.external_id.clone();
    };
    match ctx
        .database
        .message_for_reminder(reminder_id, MessageType::ReminderRequest)
        .await
    {
        Ok(Some(request)) => request.external_id,
        _ => target.external_id.clone(),
    }
}

pub struct DeleteReminderReaction;

#[async_trait]
impl ReactionAction for DeleteReminderReaction {
    fn name(&self) -> &'static str {
        "Delete a reminder"
    }

    fn keys(&self) -> &[&'static str] {
        &["❌"]
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        _event: &ReactionEvent,
        channel: Option<&Channel>,
        target: &Message,
    ) -> Result<()> {
        let channel = require_channel(channel)?;
        let reminder = match target_reminder(ctx, channel, target).await {
            Ok(reminder) => reminder,
            Err(e) => {
                ctx.notify(
                    channel,
                    "Sorry, I could not delete the reminder.",
                    Record::new(channel, MessageType::ReminderDeleteFail),
                );
                return Err(e);
            }
        };

        delete_with_messages(ctx, channel, &reminder, &[target.external_id.as_str()]).await?;
        info!("Deleted reminder {} by reaction", reminder.id);

        ctx.notify(
            channel,
            &format!(
                "I deleted the reminder \"{}\" (at {}) for you.",
                reminder.message,
                to_local_time(reminder.remind_at, channel.timezone.as_deref())
            ),
            Record::new(channel, MessageType::ReminderDeleteSuccess),
        );
        Ok(())
    }
}

/// `(name, emoji, hours)` of the add-time reactions, in registration order
pub const ADD_TIME: [(&str, &str, i64); 11] = [
    ("Add 1 hour", "1️⃣", 1),
    ("Add 2 hours", "2️⃣", 2),
    ("Add 3 hours", "3️⃣", 3),
    ("Add 4 hours", "4️⃣", 4),
    ("Add 5 hours", "5️⃣", 5),
    ("Add 6 hours", "6️⃣", 6),
    ("Add 7 hours", "7️⃣", 7),
    ("Add 8 hours", "8️⃣", 8),
    ("Add 9 hours", "9️⃣", 9),
    ("Add 10 hours", "🔟", 10),
    ("Add 1 day", "➕", 24),
];

/// Add `duration` to `base`, or to `now` if `base` already passed
fn add_time_or_from_now(base: DateTime<Utc>, now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    if base < now {
        now + duration
    } else {
        base + duration
    }
}

pub struct AddTimeReaction {
    name: &'static str,
    key: &'static str,
    hours: i64,
}

impl AddTimeReaction {
    pub fn new(name: &'static str, key: &'static str, hours: i64) -> Self {
        Self { name, key, hours }
    }

    /// One action per entry of [`ADD_TIME`]
    pub fn all() -> Vec<AddTimeReaction> {
        ADD_TIME
            .iter()
            .map(|(name, key, hours)| AddTimeReaction::new(name, key, *hours))
            .collect()
    }
}

#[async_trait]
impl ReactionAction for AddTimeReaction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn keys(&self) -> &[&'static str] {
        std::slice::from_ref(&self.key)
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &ReactionEvent,
        channel: Option<&Channel>,
        target: &Message,
    ) -> Result<()> {
        let channel = require_channel(channel)?;
        debug!("Adding {} hours with reaction {} ({})", self.hours, self.key, event.event_id);

        let reminder = target_reminder(ctx, channel, target).await?;
        let remind_at = add_time_or_from_now(reminder.remind_at, ctx.now(), Duration::hours(self.hours));
        let reminder = ctx.database.reschedule_reminder(reminder.id, remind_at).await?;

        ctx.notify(
            channel,
            &format!(
                "Reminder \"{}\" rescheduled to {}",
                reminder.message,
                to_local_time(reminder.remind_at, channel.timezone.as_deref())
            ),
            Record::new(channel, MessageType::ReminderUpdateSuccess).with_reminder(reminder.id),
        );
        Ok(())
    }
}

pub struct DeleteDailyReminderReaction;

#[async_trait]
impl ReactionAction for DeleteDailyReminderReaction {
    fn name(&self) -> &'static str {
        "Delete the daily message"
    }

    fn keys(&self) -> &[&'static str] {
        &["❌"]
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        _event: &ReactionEvent,
        channel: Option<&Channel>,
        _target: &Message,
    ) -> Result<()> {
        let channel = require_channel(channel)?;
        let channel = ctx.database.set_daily_reminder(channel.id, None).await?;

        ctx.notify(
            &channel,
            DAILY_REMINDER_OFF,
            Record::new(&channel, MessageType::DailyReminderDeleteSuccess),
        );
        Ok(())
    }
}

pub struct DoneReaction;

#[async_trait]
impl ReactionAction for DoneReaction {
    fn name(&self) -> &'static str {
        "Mark reminder as done"
    }

    fn keys(&self) -> &[&'static str] {
        &["✅"]
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        _event: &ReactionEvent,
        channel: Option<&Channel>,
        target: &Message,
    ) -> Result<()> {
        let channel = require_channel(channel)?;
        if target.reminder_id.is_none() {
            return Err(anyhow!("message {} has no reminder", target.id));
        }

        let reply_to = request_event(ctx, target).await;
        ctx.messenger.send_async(
            OutgoingMessage::plain(
                &channel.channel_identifier,
                &format!("I marked that reminder as done. {}", motivational_sentence()),
            )
            .in_reply_to(&reply_to),
        );
        ctx.messenger
            .redact_async(&channel.channel_identifier, &target.external_id);
        Ok(())
    }
}

/// Move `remind_at` forward in whole days until it is at least an hour ahead of `now`
fn next_day_slot(remind_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut next = remind_at + Duration::hours(24);
    while next - now < Duration::hours(1) {
        next += Duration::hours(24);
    }
    next
}

pub struct RescheduleReaction;

#[async_trait]
impl ReactionAction for RescheduleReaction {
    fn name(&self) -> &'static str {
        "Reschedule reminder to tomorrow"
    }

    fn keys(&self) -> &[&'static str] {
        &["🔄"]
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        _event: &ReactionEvent,
        channel: Option<&Channel>,
        target: &Message,
    ) -> Result<()> {
        let channel = require_channel(channel)?;
        let reminder = target_reminder(ctx, channel, target).await?;
        let reply_to = request_event(ctx, target).await;

        let remind_at = next_day_slot(reminder.remind_at, ctx.now());
        ctx.database.reschedule_reminder(reminder.id, remind_at).await?;
        info!("Rescheduled reminder {} to {remind_at}", reminder.id);

        ctx.messenger
            .redact_async(&channel.channel_identifier, &target.external_id);
        ctx.messenger.send_async(
            OutgoingMessage::plain(&channel.channel_identifier, "Rescheduled that reminder to tomorrow.")
                .in_reply_to(&reply_to),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_add_time_or_from_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let future = now + Duration::hours(5);
        assert_eq!(
            add_time_or_from_now(future, now, Duration::hours(1)),
            now + Duration::hours(6)
        );
        assert_eq!(
            add_time_or_from_now(now - Duration::days(2), now, Duration::hours(1)),
            now + Duration::hours(1)
        );
    }

    #[test]
    fn test_next_day_slot_skips_past_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let fired = now - Duration::days(3) + Duration::minutes(30);
        assert_eq!(next_day_slot(fired, now), now + Duration::days(1) + Duration::minutes(30));

        let soon = now - Duration::hours(23) - Duration::minutes(30);
        assert_eq!(next_day_slot(soon, now), soon + Duration::hours(48));
    }

    #[test]
    fn test_add_time_table() {
        let actions = AddTimeReaction::all();
        assert_eq!(actions.len(), 11);
        assert_eq!(actions[0].keys(), &["1️⃣"]);
        assert_eq!(actions[10].name(), "Add 1 day");
    }
}
