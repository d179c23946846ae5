// Core layer - configuration, clock, rendering and time parsing
pub mod core;

// Storage
pub mod database;

// Delivery layer - rate limiting, retries and the messenger facade
pub mod delivery;

// Features layer - scheduler, calendar export and import
pub mod features;

// Application layer
pub mod commands;

// Chat transport
pub mod discord;

pub use crate::core::{Clock, Config, SystemClock};
pub use database::Database;
pub use delivery::{DeliveryRetrier, Messenger, RateLimitGate, Transport};
pub use commands::{standard_registry, AccessPolicy, ActionContext, DispatchRouter};
pub use discord::DiscordTransport;
pub use features::{CalendarImporter, CalendarServer, ReminderScheduler};
