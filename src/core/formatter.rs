//! # Message Formatting
//!
//! Builds every outgoing text twice: a plain body and an HTML body. Also hosts the
//! small rendering helpers shared by actions and the scheduler (local time, durations,
//! reply stripping).
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Spoilers and motivational sentences
//! - 1.0.0: Dual plain/HTML builder

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rand::seq::IndexedRandom;

/// Default display format for timestamps, e.g. `14:30 24.12.2026 (CET)`
pub const DATE_FORMAT: &str = "%H:%M %d.%m.%Y (%Z)";

const MOTIVATIONAL_SENTENCES: &[&str] = &[
    "Have a nice day! 👋",
    "Enjoy your time. ✋",
    "Have fun today, I will be here if you need me. 🙌",
    "You are doing great! 🤗",
    "Keep up your hard work. 💪",
];

/// String builder producing a plain and an HTML rendition side by side
#[derive(Debug, Default, Clone)]
pub struct Formatter {
    plain: String,
    html: String,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&mut self, title: &str) -> &mut Self {
        self.plain.push_str(&format!("== {} ==\n", title.to_uppercase()));
        self.html.push_str(&format!("<h3>{title}</h3>"));
        self
    }

    pub fn sub_title(&mut self, title: &str) -> &mut Self {
        self.plain.push_str(&format!("==== {} ====\n", title.to_uppercase()));
        self.html.push_str(&format!("<h4>{title}</h4>"));
        self
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.plain.push('\n');
        self.html.push_str("<br>");
        self
    }

    /// Plain renditions have no bold, so the line is upper-cased instead
    pub fn bold_line(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(&text.to_uppercase());
        self.plain.push('\n');
        self.html.push_str(&format!("<b>{text}</b><br>"));
        self
    }

    pub fn italic_line(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(text);
        self.plain.push('\n');
        self.html.push_str(&format!("<i>{text}</i><br>"));
        self
    }

    pub fn quote_line(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(&format!("> {text}\n"));
        self.html.push_str(&format!("<blockquote>{text}</blockquote><br>"));
        self
    }

    pub fn text_line(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(text);
        self.plain.push('\n');
        self.html.push_str(text);
        self.html.push_str("<br>");
        self
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(text);
        self.html.push_str(text);
        self
    }

    pub fn spoiler(&mut self, text: &str) -> &mut Self {
        self.plain.push_str(&format!("||{text}||"));
        self.html.push_str(&format!("<span data-mx-spoiler>{text}</span>"));
        self
    }

    pub fn list<S: AsRef<str>>(&mut self, items: &[S]) -> &mut Self {
        self.html.push_str("<ul>");
        for item in items {
            let item = item.as_ref();
            self.plain.push_str(&format!("- {item}\n"));
            self.html.push_str(&format!("<li>{item}</li>"));
        }
        self.html.push_str("</ul>");
        self
    }

    /// Returns `(plain, html)`
    pub fn build(&self) -> (String, String) {
        (self.plain.clone(), self.html.clone())
    }
}

/// Resolve an IANA timezone name, falling back to UTC for missing or unknown names
pub fn parse_timezone(name: Option<&str>) -> Tz {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|n| n.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

pub fn to_local_time(time: DateTime<Utc>, timezone: Option<&str>) -> String {
    time.with_timezone(&parse_timezone(timezone))
        .format(DATE_FORMAT)
        .to_string()
}

/// Render minutes since midnight as `H:MM`
pub fn minutes_to_hour_and_minute(minutes: u32) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

pub fn to_nice_duration(duration: Duration) -> String {
    let (prefix, duration) = if duration < Duration::zero() {
        ("-", -duration)
    } else {
        ("", duration)
    };

    if duration < Duration::minutes(1) {
        format!("{prefix}{} seconds", duration.num_seconds())
    } else if duration < Duration::hours(1) {
        format!("{prefix}{} minutes", duration.num_minutes())
    } else if duration < Duration::hours(48) {
        format!("{prefix}{} hours", duration.num_hours())
    } else {
        format!("{prefix}{} days", duration.num_days())
    }
}

/// Remove quoted reply lines (`> ...`) a client prepends to a reply body
pub fn strip_reply(body: &str) -> String {
    body.lines()
        .filter(|line| !line.starts_with('>'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse the trailing whitespace-separated integer, e.g. `delete reminder 12` -> 12
pub fn suffix_int(text: &str) -> Option<i64> {
    text.split_whitespace().last()?.parse().ok()
}

pub fn motivational_sentence() -> &'static str {
    MOTIVATIONAL_SENTENCES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("Have a nice day! 👋")
}
