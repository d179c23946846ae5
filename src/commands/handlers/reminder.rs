//! Reminder creation and the ID-addressed reminder commands
//!
//! Handles: new reminders, reschedule by reply, delete reminder N, change reminder N
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 2.0.0: Free-text reminders with natural time parsing
//! - 1.0.0: Extracted from command_handler.rs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::Action;
use crate::core::{parse_time, suffix_int, to_local_time, Formatter};
use crate::database::{Channel, Message, MessageType, Reminder};
use crate::delivery::{OutgoingMessage, Record};
use crate::features::reminders::REQUEST_REACTIONS;

/// Treat a message nothing else claimed as a new reminder
pub async fn create_reminder(
    ctx: &ActionContext,
    event: &MessageEvent,
    channel: &Channel,
) -> Result<()> {
    let text = event.text();
    let remind_at = match parse_time(&text, channel.timezone.as_deref(), ctx.now(), false) {
        Ok(at) => at,
        Err(e) => {
            debug!("No time in message {}: {e}", event.event_id);
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry I was not able to understand the remind date and time from this message",
                MessageType::ReminderFail,
            );
            return Ok(());
        }
    };

    let reminder = ctx
        .database
        .add_reminder(channel.id, &text, remind_at, 0, 0, ctx.now())
        .await?;
    ctx.try_record_event(event, channel, Some(reminder.id), MessageType::ReminderRequest)
        .await;

    let body = format!(
        "Successfully added new reminder (ID: {}) for {}",
        reminder.id,
        to_local_time(reminder.remind_at, channel.timezone.as_deref())
    );
    info!("{body} in channel {}", channel.id);

    if let Err(e) = ctx
        .messenger
        .send_and_store(
            OutgoingMessage::plain(&channel.channel_identifier, &body).in_reply_to(&event.event_id),
            Record::new(channel, MessageType::ReminderSuccess).with_reminder(reminder.id),
        )
        .await
    {
        warn!("Was not able to confirm reminder {}: {e}", reminder.id);
    }

    ctx.messenger
        .react_async(&channel.channel_identifier, &event.event_id, &REQUEST_REACTIONS);
    Ok(())
}

/// Reply to a reminder-bearing message that no reply action understood: move the reminder
pub async fn reschedule_from_reply(
    ctx: &ActionContext,
    event: &MessageEvent,
    channel: &Channel,
    replied_to: &Message,
) -> Result<()> {
    let reminder_id = replied_to
        .reminder_id
        .ok_or_else(|| anyhow!("message {} has no reminder", replied_to.id))?;

    let remind_at = match parse_time(&event.text(), channel.timezone.as_deref(), ctx.now(), false) {
        Ok(at) => at,
        Err(e) => {
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry I was not able to get a time out of that message",
                MessageType::ReminderUpdateFail,
            );
            return Err(e);
        }
    };

    ctx.database
        .get_reminder_for_channel(channel.id, reminder_id)
        .await?
        .ok_or_else(|| anyhow!("reminder {reminder_id} is not in channel {}", channel.id))?;
    let reminder = ctx.database.reschedule_reminder(reminder_id, remind_at).await?;
    ctx.try_record_event(event, channel, Some(reminder.id), MessageType::ReminderUpdate)
        .await;

    let body = format!(
        "I rescheduled your reminder \"{}\" to {}.",
        reminder.message,
        to_local_time(reminder.remind_at, channel.timezone.as_deref())
    );
    ctx.messenger.send_and_store_async(
        OutgoingMessage::plain(&channel.channel_identifier, &body).in_reply_to(&event.event_id),
        Record::new(channel, MessageType::ReminderUpdateSuccess).with_reminder(reminder.id),
    );
    Ok(())
}

/// Delete a reminder and redact every recorded message tied to it plus `extra` events
pub(super) async fn delete_with_messages(
    ctx: &ActionContext,
    channel: &Channel,
    reminder: &Reminder,
    extra: &[&str],
) -> Result<()> {
    let mut messages = match ctx.database.messages_by_reminder(reminder.id).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!("Failed to get messages for reminder {}: {e}", reminder.id);
            Vec::new()
        }
    };
    ctx.database.delete_reminder(reminder.id).await?;

    let mut seen: HashSet<String> = HashSet::new();
    messages.retain(|m| seen.insert(m.external_id.clone()));
    for event_id in extra {
        if seen.insert(event_id.to_string()) {
            ctx.messenger
                .redact_async(&channel.channel_identifier, event_id);
        }
    }
    ctx.redact_messages(channel, &messages);
    Ok(())
}

/// "delete reminder 3"
pub struct DeleteReminderAction;

#[async_trait]
impl Action for DeleteReminderAction {
    fn name(&self) -> &'static str {
        "Delete a reminder"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["delete 1", "delete reminder 1", "remove 1"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(^(delete|remove)[ ]*(reminder|)[ ]+[0-9]+)$"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        let Some(reminder_id) = suffix_int(&event.text()) else {
            ctx.reply(
                channel,
                &event.event_id,
                "Whupsy, I expected a number in that message but could not find it.",
                MessageType::DoNotSave,
            );
            return Ok(());
        };

        let Some(reminder) = ctx
            .database
            .get_reminder_for_channel(channel.id, reminder_id)
            .await?
        else {
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry, I do not know this reminder.",
                MessageType::DoNotSave,
            );
            return Ok(());
        };

        delete_with_messages(ctx, channel, &reminder, &[]).await?;
        info!("Deleted reminder {} on request", reminder.id);

        let mut formatter = Formatter::new();
        formatter
            .text_line("Deleted the reminder: ")
            .quote_line(&reminder.message);
        ctx.reply_formatted(
            channel,
            &event.event_id,
            formatter.build(),
            Record::new(channel, MessageType::ReminderDelete),
        );
        Ok(())
    }
}

fn change_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^(change|update|set)[ ]+(reminder id|reminder|)[ ]*([0-9]+)"))
        .as_ref()
        .map_err(|e| anyhow!("invalid change pattern: {e}"))
}

/// "change reminder 3 to tomorrow 10:00"
pub struct ChangeReminderAction;

#[async_trait]
impl Action for ChangeReminderAction {
    fn name(&self) -> &'static str {
        "Change a reminder"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["change reminder 1 to tomorrow", "update 1 to Monday 10:00"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(^(change|update|set)[ ]+(reminder|reminder id|)[ ]*[0-9]+)"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        let text = event.text();
        let captures = change_pattern()?.captures(&text);
        let Some((reminder_id, rest)) = captures.and_then(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(3)?.as_str().parse::<i64>().ok()?;
            Some((id, text[whole.end()..].to_string()))
        }) else {
            ctx.reply(
                channel,
                &event.event_id,
                "Ups, seems like there is a reminder ID missing in your message.",
                MessageType::ReminderUpdateFail,
            );
            return Ok(());
        };

        let remind_at = match parse_time(&rest, channel.timezone.as_deref(), ctx.now(), false) {
            Ok(at) => at,
            Err(e) => {
                debug!("No time in change request {}: {e}", event.event_id);
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Ehm, sorry to say that, but I was not able to understand the time to schedule the reminder to.",
                    MessageType::ReminderUpdateFail,
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
            ctx.reply(
                channel,
                &event.event_id,
                "This reminder is not in my database.",
                MessageType::ReminderUpdateFail,
            );
            return Ok(());
        }

        let reminder = ctx.database.reschedule_reminder(reminder_id, remind_at).await?;
        ctx.try_record_event(event, channel, Some(reminder.id), MessageType::ReminderUpdate)
            .await;

        let mut formatter = Formatter::new();
        formatter
            .text_line("I rescheduled your reminder")
            .quote_line(&reminder.message)
            .text_line(&format!(
                "to {}",
                to_local_time(reminder.remind_at, channel.timezone.as_deref())
            ));
        ctx.reply_formatted(
            channel,
            &event.event_id,
            formatter.build(),
            Record::new(channel, MessageType::ReminderUpdateSuccess).with_reminder(reminder.id),
        );
        Ok(())
    }
}
