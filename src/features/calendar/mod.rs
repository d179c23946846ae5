//! # Feature: Calendars
//!
//! Read-only iCalendar feed of a channel's open reminders, protected by the channel's
//! calendar secret, and import of external calendars the channel subscribed to.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.1.0: Import of subscribed iCalendar feeds
//! - 1.0.0: Initial iCalendar rendering and HTTP feed

pub mod ical;
pub mod import;
pub mod importer;
pub mod server;

pub use ical::render_icalendar;
pub use importer::{CalendarImporter, CalendarSource, HttpCalendarSource};
pub use server::CalendarServer;

/// Secrets shorter than this are not handed out as links
pub const MIN_SECRET_LENGTH: usize = 20;

/// Public link to a channel's calendar feed
pub fn calendar_link(base_url: &str, channel_id: i64, secret: &str) -> String {
    format!(
        "{}/calendar/{channel_id}/ical?token={secret}",
        base_url.trim_end_matches('/')
    )
}
