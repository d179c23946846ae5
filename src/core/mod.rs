//! # Core Module
//!
//! Configuration, clock, rendering and time parsing shared by every layer.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add natural time parser
//! - 1.0.0: Initial creation with config, clock and formatter

pub mod clock;
pub mod config;
pub mod formatter;
pub mod time_parser;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use formatter::{
    minutes_to_hour_and_minute, motivational_sentence, parse_timezone, strip_reply, suffix_int,
    to_local_time, to_nice_duration, Formatter,
};
pub use time_parser::{parse_interval, parse_time};
