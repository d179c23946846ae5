//! Channel settings
//!
//! Handles: set timezone, set daily reminder, delete daily reminder
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Timezone and daily digest settings

use anyhow::Result;
use async_trait::async_trait;
use chrono::Timelike;
use chrono_tz::Tz;
use log::{debug, info};

use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::Action;
use crate::core::{minutes_to_hour_and_minute, parse_time, parse_timezone, to_local_time};
use crate::database::{Channel, MessageType};

const TIMEZONE_PREFIX: &str = "set timezone ";

pub struct TimezoneAction;

#[async_trait]
impl Action for TimezoneAction {
    fn name(&self) -> &'static str {
        "Set a timezone"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["set timezone Europe/Berlin", "set timezone America/Metlakatla", "set timezone UTC"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^set timezone .*$"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::TimezoneChangeRequest)
            .await;

        let text = event.text();
        let name = text.get(TIMEZONE_PREFIX.len()..).unwrap_or_default().trim();
        if name.parse::<Tz>().is_err() {
            debug!("Unknown timezone {name:?} in channel {}", channel.id);
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry, I do not know this timezone.",
                MessageType::TimezoneChangeFail,
            );
            return Ok(());
        }

        let channel = ctx.database.set_channel_timezone(channel.id, name).await?;
        info!("Channel {} switched to timezone {name}", channel.id);
        ctx.reply(
            &channel,
            &event.event_id,
            &format!(
                "Great, I updated your timezone to {name}. Currently it is {}",
                to_local_time(ctx.now(), Some(name))
            ),
            MessageType::TimezoneChangeSuccess,
        );
        Ok(())
    }
}

pub struct SetDailyReminderAction;

#[async_trait]
impl Action for SetDailyReminderAction {
    fn name(&self) -> &'static str {
        "Set daily reminder"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["set daily reminder at 10:00", "daily message at 9 pm"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^(set|update|change|)[ ]*(the|a|my|)[ ]*(daily reminder|daily info|daily message).*"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::DailyReminderUpdate)
            .await;

        let timezone = channel.timezone.as_deref();
        let at = match parse_time(&event.text(), timezone, ctx.now(), true) {
            Ok(at) => at,
            Err(e) => {
                debug!("No digest time in {}: {e}", event.event_id);
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Sorry, I was not able to understand the time.",
                    MessageType::DailyReminderUpdateFail,
                );
                return Ok(());
            }
        };

        let local = at.with_timezone(&parse_timezone(timezone));
        let minutes = local.hour() * 60 + local.minute();
        let channel = ctx.database.set_daily_reminder(channel.id, Some(minutes)).await?;

        ctx.reply(
            &channel,
            &event.event_id,
            &format!(
                "I will send you a daily overview at {}. To disable this message me with \"delete daily reminder\".",
                minutes_to_hour_and_minute(minutes)
            ),
            MessageType::DailyReminderUpdateSuccess,
        );
        Ok(())
    }
}

pub struct DeleteDailyReminderAction;

#[async_trait]
impl Action for DeleteDailyReminderAction {
    fn name(&self) -> &'static str {
        "Delete daily reminder"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["delete daily reminder", "remove daily message"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^(remove|delete|cancel)[ ]*(the|a|my|)[ ]*(daily reminder|daily info|daily message).*"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::DailyReminderDelete)
            .await;
        let channel = ctx.database.set_daily_reminder(channel.id, None).await?;

        ctx.reply(
            &channel,
            &event.event_id,
            DAILY_REMINDER_OFF,
            MessageType::DailyReminderDeleteSuccess,
        );
        Ok(())
    }
}

pub(super) const DAILY_REMINDER_OFF: &str = "I will no longer send you a daily message. To reactivate this feature message me with \"set daily reminder at 10:00\".";
