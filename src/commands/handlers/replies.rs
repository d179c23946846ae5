//! Reply actions on reminder messages
//!
//! Handles: delete, make recurring
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Recurring replies reactivate fired reminders and are recorded
//! - 1.0.0: Delete and recurring replies

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use super::reminder::delete_with_messages;
use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::ReplyAction;
use crate::core::{parse_interval, to_local_time, to_nice_duration};
use crate::database::{Channel, Message, MessageType};
use crate::delivery::{OutgoingMessage, Record};

const REMINDER_MESSAGES: &[MessageType] = &[
    MessageType::ReminderRequest,
    MessageType::ReminderSuccess,
    MessageType::Reminder,
];

/// Recurring reminders run for this long
fn recurring_horizon() -> Duration {
    Duration::days(5 * 365)
}

pub struct DeleteReply;

#[async_trait]
impl ReplyAction for DeleteReply {
    fn name(&self) -> &'static str {
        "Delete a reminder"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["delete", "remove", "cancel"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^(delete|remove|cancel)$"
    }

    fn reply_to_types(&self) -> &'static [MessageType] {
        REMINDER_MESSAGES
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &MessageEvent,
        channel: &Channel,
        replied_to: &Message,
    ) -> Result<()> {
        let reminder = match replied_to.reminder_id {
            Some(id) => ctx.database.get_reminder_for_channel(channel.id, id).await?,
            None => None,
        };
        let Some(reminder) = reminder else {
            ctx.notify(
                channel,
                "Sorry, I could not delete the reminder.",
                Record::new(channel, MessageType::ReminderDeleteFail),
            );
            return Err(anyhow!("message {} has no known reminder", replied_to.id));
        };

        delete_with_messages(
            ctx,
            channel,
            &reminder,
            &[replied_to.external_id.as_str(), event.event_id.as_str()],
        )
        .await?;
        info!("Deleted reminder {} by reply", reminder.id);

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

pub struct RecurringReply;

#[async_trait]
impl ReplyAction for RecurringReply {
    fn name(&self) -> &'static str {
        "Make a reminder recurring"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["every 10 days", "each twenty two hours"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(repeat|every|each|always|recurring|all|any).*(second|minute|day|hour)(|s)$"
    }

    fn reply_to_types(&self) -> &'static [MessageType] {
        REMINDER_MESSAGES
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        event: &MessageEvent,
        channel: &Channel,
        replied_to: &Message,
    ) -> Result<()> {
        let Some(reminder_id) = replied_to.reminder_id else {
            ctx.notify(
                channel,
                "Sorry, I could not make that reminder recurring.",
                Record::new(channel, MessageType::ReminderRecurringFail),
            );
            return Err(anyhow!("message {} has no reminder", replied_to.id));
        };

        let horizon = recurring_horizon();
        let interval = match parse_interval(&event.text()) {
            Some(interval) if interval > Duration::minutes(1) && interval <= horizon => interval,
            _ => {
                debug!("Interval in {} is out of range or missing", event.event_id);
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Sorry, I need an interval of more than one minute and at most five years.",
                    MessageType::ReminderRecurringFail,
                );
                return Ok(());
            }
        };

        if ctx
            .database
            .get_reminder_for_channel(channel.id, reminder_id)
            .await?
            .is_none()
        {
            return Err(anyhow!("reminder {reminder_id} is not in channel {}", channel.id));
        }

        let repeat_max = horizon.num_minutes() / interval.num_minutes();
        let reminder = ctx
            .database
            .set_reminder_repeat(reminder_id, interval.num_minutes(), repeat_max, ctx.now())
            .await?;
        ctx.try_record_event(
            event,
            channel,
            Some(reminder.id),
            MessageType::ReminderRecurringRequest,
        )
        .await;

        let last = last_occurrence(reminder.remind_at, interval, repeat_max)
            .ok_or_else(|| anyhow!("last occurrence of reminder {} is out of range", reminder.id))?;
        ctx.messenger.send_and_store_async(
            OutgoingMessage::plain(
                &channel.channel_identifier,
                &format!(
                    "Updated the reminder to remind you every {} until {}",
                    to_nice_duration(interval),
                    to_local_time(last, channel.timezone.as_deref())
                ),
            )
            .in_reply_to(&event.event_id),
            Record::new(channel, MessageType::ReminderRecurringSuccess).with_reminder(reminder.id),
        );
        Ok(())
    }
}

/// Time of occurrence number `count`, counting `first` as the first one
fn last_occurrence(first: DateTime<Utc>, interval: Duration, count: i64) -> Option<DateTime<Utc>> {
    let steps = i32::try_from(count.checked_sub(1)?).ok()?;
    first.checked_add_signed(interval.checked_mul(steps)?)
}
