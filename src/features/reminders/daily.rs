//! Daily digest of the reminders due within the next 24 hours

use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use log::{debug, info, warn};

use super::scheduler::ReminderScheduler;
use super::DIGEST_REACTIONS;
use crate::core::{parse_timezone, to_local_time, to_nice_duration, Formatter};
use crate::database::{Channel, MessageType, Reminder};
use crate::delivery::{OutgoingMessage, Record};

/// A digest counts as "already sent today" for this long
pub fn digest_window() -> Duration {
    Duration::hours(23) + Duration::minutes(58)
}

/// Returns `(plain, html)` of a digest listing `reminders`
pub fn render_digest(reminders: &[Reminder], timezone: Option<&str>) -> (String, String) {
    let mut formatter = Formatter::new();
    formatter.title("Your reminders for today");

    for reminder in reminders {
        let mut when = format!("At {}", to_local_time(reminder.remind_at, timezone));
        if reminder.repeats() {
            when.push_str(&format!(
                " (repeat every {})",
                to_nice_duration(reminder.repeat_interval())
            ));
        }
        formatter.bold_line(&reminder.message).text_line(&when);
    }
    formatter.build()
}

impl ReminderScheduler {
    /// One digest pass over every channel with a digest time; errors are logged
    pub async fn run_daily_pass(&self) -> usize {
        match self.send_daily_digests().await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("Daily digest pass failed: {e}");
                0
            }
        }
    }

    pub async fn send_daily_digests(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut sent = 0;

        for channel in self.database.channels_with_daily_reminder().await? {
            match self.send_digest(&channel, now).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!("Daily digest for channel {} failed: {e}", channel.id),
            }
        }
        Ok(sent)
    }

    async fn send_digest(&self, channel: &Channel, now: DateTime<Utc>) -> Result<bool> {
        let Some(digest_at) = channel.daily_reminder else {
            return Ok(false);
        };

        let local = now.with_timezone(&parse_timezone(channel.timezone.as_deref()));
        if local.hour() * 60 + local.minute() < digest_at {
            return Ok(false);
        }

        if let Some(last) = self
            .database
            .last_message_of_type(MessageType::DailyReminder, channel.id)
            .await?
        {
            if now - last.timestamp < digest_window() {
                return Ok(false);
            }
        }

        let reminders = self.database.due_within_24h(channel.id, now).await?;
        if reminders.is_empty() {
            debug!("Nothing due for channel {}, no digest", channel.id);
            return Ok(false);
        }

        let (body, body_html) = render_digest(&reminders, channel.timezone.as_deref());
        let stored = self
            .messenger
            .send_and_store(
                OutgoingMessage::formatted(&channel.channel_identifier, body, body_html),
                Record::new(channel, MessageType::DailyReminder),
            )
            .await?;

        if let Some(digest) = stored {
            self.messenger
                .react_async(&channel.channel_identifier, &digest.external_id, &DIGEST_REACTIONS);
        }
        info!(
            "Sent daily digest with {} reminders to channel {}",
            reminders.len(),
            channel.id
        );
        Ok(true)
    }
}
