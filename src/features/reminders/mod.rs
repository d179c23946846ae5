//! # Feature: Reminders
//!
//! Fires due reminders and sends the daily digest.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Repeating reminders, daily digest, delivery through the retrying messenger
//! - 1.0.0: Initial scheduled reminders

pub mod daily;
pub mod scheduler;

pub use daily::render_digest;
pub use scheduler::ReminderScheduler;

/// Reactions offered on a fired reminder: done, reschedule, delete
pub const FIRED_REACTIONS: [&str; 3] = ["✅", "🔄", "❌"];

/// Reactions offered on a new reminder request: delete, +1 hour, +1 day
pub const REQUEST_REACTIONS: [&str; 3] = ["❌", "1️⃣", "➕"];

/// Reactions offered on a daily digest: turn the digest off
pub const DIGEST_REACTIONS: [&str; 1] = ["❌"];
