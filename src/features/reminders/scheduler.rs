//! Background loop firing due reminders and daily digests
//!
//! - **Version**: 2.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.1.0: Imported reminders fire without a request message
//! - 2.0.0: Fired reminders are committed conditionally, overlapping passes skip reminders
//!   that are still being delivered; daily digest pass
//! - 1.0.0: Initial polling scheduler

use anyhow::Result;
use dashmap::DashSet;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::FIRED_REACTIONS;
use crate::core::{to_local_time, Clock, Formatter};
use crate::database::{Database, MessageType, Reminder};
use crate::delivery::{DeliveryTicket, Messenger, OutgoingMessage, Record, RetryPolicy};

/// Minimum spacing between two due passes
pub const PASS_INTERVAL: Duration = Duration::from_secs(60);

/// The daily digest check runs on every n-th due pass
pub const DAILY_EVERY_PASSES: u64 = 5;

#[derive(Clone)]
pub struct ReminderScheduler {
    pub(super) database: Database,
    pub(super) messenger: Messenger,
    pub(super) clock: Arc<dyn Clock>,
    tick: Duration,
    in_flight: Arc<DashSet<i64>>,
    shutdown: Arc<Notify>,
}

impl ReminderScheduler {
    pub fn new(
        database: Database,
        messenger: Messenger,
        clock: Arc<dyn Clock>,
        tick: Duration,
    ) -> Self {
        ReminderScheduler {
            database,
            messenger,
            clock,
            tick: tick.max(Duration::from_millis(1)),
            in_flight: Arc::new(DashSet::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn ticks_per_pass(&self) -> u64 {
        (PASS_INTERVAL.as_millis() / self.tick.as_millis().max(1)).max(1) as u64
    }

    /// Run until [`ReminderScheduler::shutdown`] is called.
    ///
    /// The stop signal is checked between ticks; deliveries already handed to the
    /// background workers are not awaited.
    pub async fn run(&self) {
        info!("Reminder scheduler started (tick {:?})", self.tick);
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let ticks_per_pass = self.ticks_per_pass();
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("Reminder scheduler stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            if ticks % ticks_per_pass == 0 {
                let pass = ticks / ticks_per_pass;
                self.run_due_pass().await;
                if pass % DAILY_EVERY_PASSES == 0 {
                    self.run_daily_pass().await;
                }
            }
            ticks = ticks.wrapping_add(1);
        }
    }

    /// Signal the loop to stop
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// One due-reminder pass; errors are logged
    pub async fn run_due_pass(&self) -> Vec<DeliveryTicket> {
        match self.spawn_due_reminders().await {
            Ok(tickets) => tickets,
            Err(e) => {
                error!("Due reminder pass failed: {e}");
                Vec::new()
            }
        }
    }

    /// Hand every due reminder to the delivery workers, one job per reminder
    pub async fn spawn_due_reminders(&self) -> Result<Vec<DeliveryTicket>> {
        let now = self.clock.now();
        let due = self.database.due_reminders(now).await?;
        if !due.is_empty() {
            debug!("{} reminders due", due.len());
        }

        let mut tickets = Vec::with_capacity(due.len());
        for reminder in due {
            if !self.in_flight.insert(reminder.id) {
                debug!("Reminder {} still being delivered, skipping", reminder.id);
                continue;
            }

            let scheduler = self.clone();
            tickets.push(self.messenger.retrier().submit(
                format!("reminder {}", reminder.id),
                async move {
                    let id = reminder.id;
                    let result = scheduler.fire_reminder(reminder).await;
                    scheduler.in_flight.remove(&id);
                    result
                },
            ));
        }
        Ok(tickets)
    }

    /// Deliver one reminder and commit the fired state.
    ///
    /// The commit is the last step: a failure before it leaves the reminder due for the
    /// next pass.
    async fn fire_reminder(&self, reminder: Reminder) -> Result<()> {
        let Some(channel) = self.database.get_channel(reminder.channel_id).await? else {
            warn!("Reminder {} belongs to no live channel, skipping", reminder.id);
            return Ok(());
        };
        let request = self
            .database
            .message_for_reminder(reminder.id, MessageType::ReminderRequest)
            .await?;
        // Imported reminders have no chat request and are sent on their own
        if request.is_none() && reminder.resource_id.is_none() {
            warn!("Reminder {} has no request message, skipping", reminder.id);
            return Ok(());
        }

        let mut formatter = Formatter::new();
        formatter
            .text(&self.messenger.mention(&channel.user_identifier))
            .text(" a reminder for you: ")
            .text(&reminder.message)
            .text(&format!(
                " (at {})",
                to_local_time(reminder.remind_at, channel.timezone.as_deref())
            ));
        let (body, body_html) = formatter.build();

        let mut message = OutgoingMessage::formatted(&channel.channel_identifier, body, body_html);
        if let Some(request) = &request {
            message = message.in_reply_to(&request.external_id);
        }
        let record = Record::new(&channel, MessageType::Reminder).with_reminder(reminder.id);

        if let Some(fired) = self
            .messenger
            .send_and_store_with(message, record, RetryPolicy::MESSAGE)
            .await?
        {
            self.messenger
                .react_async(&channel.channel_identifier, &fired.external_id, &FIRED_REACTIONS);
        }

        match self
            .database
            .commit_fired_reminder(&reminder, self.clock.now())
            .await?
        {
            Some(next) if next.active => info!(
                "Fired reminder {} ({}/{}), next at {}",
                reminder.id, next.repeated, next.repeat_max, next.remind_at
            ),
            Some(_) => info!("Fired reminder {}", reminder.id),
            None => warn!("Reminder {} changed while firing", reminder.id),
        }
        Ok(())
    }
}
