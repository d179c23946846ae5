//! # Calendar Importer
//!
//! Background loop refreshing every subscribed iCalendar feed. Each upcoming event
//! becomes a reminder five minutes before it starts; refreshing moves the reminder when
//! the event moves.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.0.0: Periodic import of subscribed calendars

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::import::parse_events;
use crate::core::{parse_timezone, Clock};
use crate::database::{Database, ResourceKind, ThirdPartyResource};

/// Minutes between the reminder and the start of an imported event
pub const IMPORT_LEAD_MINUTES: i64 = 5;

const FETCH_TIMEOUT_SECS: u64 = 60;

/// Larger feeds are refused
const MAX_CALENDAR_BYTES: u64 = 5 * 1024 * 1024;

/// Events with shorter uids cannot be told apart reliably
const MIN_UID_LENGTH: usize = 3;

/// Where calendar documents come from
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches calendars over HTTP(S)
pub struct HttpCalendarSource {
    client: reqwest::Client,
}

impl HttpCalendarSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("remindme/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpCalendarSource { client })
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/calendar")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request timed out after {FETCH_TIMEOUT_SECS} seconds")
                } else if e.is_connect() {
                    anyhow!("Could not connect to the server")
                } else {
                    anyhow!("HTTP request failed: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Server returned HTTP {status}"));
        }
        if response
            .content_length()
            .is_some_and(|length| length > MAX_CALENDAR_BYTES)
        {
            return Err(anyhow!("Calendar is larger than {MAX_CALENDAR_BYTES} bytes"));
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > MAX_CALENDAR_BYTES {
            return Err(anyhow!("Calendar is larger than {MAX_CALENDAR_BYTES} bytes"));
        }
        debug!("Fetched {} bytes from {url}", bytes.len());
        String::from_utf8(bytes.to_vec()).map_err(|_| anyhow!("Calendar is not valid UTF-8"))
    }
}

#[derive(Clone)]
pub struct CalendarImporter {
    database: Database,
    source: Arc<dyn CalendarSource>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl CalendarImporter {
    pub fn new(
        database: Database,
        source: Arc<dyn CalendarSource>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        CalendarImporter {
            database,
            source,
            clock,
            interval: interval.max(Duration::from_millis(1)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Refresh on start and then every interval until [`CalendarImporter::shutdown`] is called
    pub async fn run(&self) {
        info!("Calendar importer started (every {:?})", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("Calendar importer stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let imported = self.import_all().await;
            if imported > 0 {
                debug!("Imported {imported} calendar events");
            }
        }
    }

    /// Signal the loop to stop
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Refresh every subscribed calendar once; failures skip that calendar.
    /// Returns the number of events imported or updated.
    pub async fn import_all(&self) -> usize {
        let resources = match self.database.third_party_resources(ResourceKind::Ical).await {
            Ok(resources) => resources,
            Err(e) => {
                error!("Failed to load calendar subscriptions: {e}");
                return 0;
            }
        };

        let mut imported = 0;
        for resource in resources {
            let content = match self.source.fetch(&resource.url).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(
                        "Failed to fetch calendar {} of channel {}: {e}",
                        resource.id, resource.channel_id
                    );
                    continue;
                }
            };

            match self.import_content(&resource, &content).await {
                Ok(count) => imported += count,
                Err(e) => warn!(
                    "Failed to import calendar {} of channel {}: {e}",
                    resource.id, resource.channel_id
                ),
            }
        }
        imported
    }

    /// Turn the upcoming events of one calendar document into reminders
    pub async fn import_content(&self, resource: &ThirdPartyResource, content: &str) -> Result<usize> {
        let Some(channel) = self.database.get_channel(resource.channel_id).await? else {
            return Ok(0);
        };
        let events = parse_events(content, parse_timezone(channel.timezone.as_deref()))?;

        let now = self.clock.now();
        let lead = chrono::Duration::minutes(IMPORT_LEAD_MINUTES);
        let threshold = now
            .checked_add_signed(lead)
            .ok_or_else(|| anyhow!("import threshold out of range"))?;

        let mut imported = 0;
        for event in events {
            if event.uid.len() < MIN_UID_LENGTH {
                debug!("Skipping event with short uid {:?}", event.uid);
                continue;
            }
            if event.name.is_empty() {
                debug!("Skipping event {} without a name", event.uid);
                continue;
            }
            let Some(start) = event.first_start_from(threshold) else {
                continue;
            };
            let Some(remind_at) = start.checked_sub_signed(lead) else {
                continue;
            };

            self.database
                .upsert_imported_reminder(resource, &event.uid, &event.name, remind_at, now)
                .await?;
            imported += 1;
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::database::Role;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves calendars from memory; unknown urls fail
    #[derive(Default)]
    struct StaticSource {
        calendars: Mutex<HashMap<String, String>>,
    }

    impl StaticSource {
        fn set(&self, url: &str, content: &str) {
            self.calendars
                .lock()
                .unwrap()
                .insert(url.to_string(), content.to_string());
        }
    }

    #[async_trait]
    impl CalendarSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calendars
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("HTTP 404"))
        }
    }

    const URL: &str = "https://cal.example/team.ics";

    struct Fixture {
        importer: CalendarImporter,
        source: Arc<StaticSource>,
        db: Database,
        clock: ManualClock,
        resource: ThirdPartyResource,
    }

    async fn fixture(now: DateTime<Utc>) -> Fixture {
        let db = Database::new(":memory:").await.unwrap();
        let clock = ManualClock::new(now);
        let channel = db.add_channel("dm-1", "user-1", Role::User, now).await.unwrap();
        let resource = db
            .add_third_party_resource(channel.id, ResourceKind::Ical, URL, now)
            .await
            .unwrap();
        let source = Arc::new(StaticSource::default());
        let importer = CalendarImporter::new(
            db.clone(),
            source.clone(),
            Arc::new(clock.clone()),
            Duration::from_millis(10),
        );
        Fixture {
            importer,
            source,
            db,
            clock,
            resource,
        }
    }

    fn calendar(events: &[(&str, &str, &str)]) -> String {
        let mut content = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n");
        for (uid, start, summary) in events {
            content.push_str(&format!(
                "BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTART:{start}\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\n"
            ));
        }
        content.push_str("END:VCALENDAR\r\n");
        content
    }

    #[tokio::test]
    async fn test_upcoming_events_become_reminders_five_minutes_early() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let f = fixture(now).await;
        f.source.set(
            URL,
            &calendar(&[
                ("standup-1", "20260504T090000Z", "Standup"),
                ("past-1", "20260504T070000Z", "Breakfast"),
                ("soon-1", "20260504T080300Z", "Starts too soon"),
                ("x", "20260504T100000Z", "Short uid"),
                ("noname", "20260504T100000Z", ""),
            ]),
        );

        assert_eq!(f.importer.import_all().await, 1);

        let reminders = f.db.pending_reminders(f.resource.channel_id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].message, "Standup");
        assert_eq!(reminders[0].remind_at, Utc.with_ymd_and_hms(2026, 5, 4, 8, 55, 0).unwrap());
        assert_eq!(reminders[0].resource_id, Some(f.resource.id));
    }

    #[tokio::test]
    async fn test_refresh_moves_existing_reminder() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let f = fixture(now).await;
        f.source
            .set(URL, &calendar(&[("standup-1", "20260504T090000Z", "Standup")]));
        f.importer.import_all().await;

        f.source
            .set(URL, &calendar(&[("standup-1", "20260504T093000Z", "Standup (late)")]));
        f.clock.advance(chrono::Duration::minutes(10));
        assert_eq!(f.importer.import_all().await, 1);

        let reminders = f.db.pending_reminders(f.resource.channel_id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].message, "Standup (late)");
        assert_eq!(reminders[0].remind_at, Utc.with_ymd_and_hms(2026, 5, 4, 9, 25, 0).unwrap());
    }

    #[tokio::test]
    async fn test_recurring_event_tracks_next_occurrence() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let f = fixture(now).await;
        f.source.set(
            URL,
            "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:daily-1\r\nDTSTART:20260101T090000Z\r\n\
             RRULE:FREQ=DAILY\r\nSUMMARY:Journal\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        );

        f.importer.import_all().await;
        let reminders = f.db.pending_reminders(f.resource.channel_id).await.unwrap();
        assert_eq!(reminders[0].remind_at, Utc.with_ymd_and_hms(2026, 5, 5, 8, 55, 0).unwrap());
    }

    #[tokio::test]
    async fn test_failing_calendar_does_not_stop_others() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let f = fixture(now).await;
        let broken = "https://cal.example/broken.ics";
        f.db.add_third_party_resource(f.resource.channel_id, ResourceKind::Ical, broken, now)
            .await
            .unwrap();
        f.db.add_third_party_resource(
            f.resource.channel_id,
            ResourceKind::Ical,
            "https://cal.example/missing.ics",
            now,
        )
        .await
        .unwrap();
        f.source.set(broken, "<html>gone</html>");
        f.source
            .set(URL, &calendar(&[("standup-1", "20260504T090000Z", "Standup")]));

        assert_eq!(f.importer.import_all().await, 1);
    }

    #[tokio::test]
    async fn test_importer_runs_and_stops() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let f = fixture(now).await;
        f.source
            .set(URL, &calendar(&[("standup-1", "20260504T090000Z", "Standup")]));

        let importer = f.importer.clone();
        let handle = tokio::spawn(async move { importer.run().await });

        for _ in 0..200 {
            if !f.db.pending_reminders(f.resource.channel_id).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.db.pending_reminders(f.resource.channel_id).await.unwrap().len(), 1);

        f.importer.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Importer should shut down within timeout")
            .unwrap();
    }
}
