//! # Features
//!
//! Background features built on top of the store and the delivery layer.

pub mod calendar;
pub mod reminders;

pub use calendar::{
    calendar_link, render_icalendar, CalendarImporter, CalendarServer, HttpCalendarSource,
};
pub use reminders::ReminderScheduler;
