//! # Natural Time Parsing
//!
//! Turns free text such as "laundry tomorrow at 9", "dentist 24.12. 14:30" or
//! "call mom in 2 hours" into a UTC timestamp, interpreted in the channel's timezone.
//!
//! - **Version**: 1.2.1
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.1: Out of range offsets are parse errors
//! - 1.2.0: Month names and ordinal dates
//! - 1.1.0: Repeat interval extraction for recurring reminders
//! - 1.0.0: Relative offsets, weekdays and times of day

use anyhow::{anyhow, Result};
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use super::formatter::{parse_timezone, strip_reply};

const NUMBER: &str = r"\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve";

struct Patterns {
    relative: Regex,
    duration_part: Regex,
    compact: Regex,
    iso_date: Regex,
    dotted_date: Regex,
    day_month_name: Regex,
    month_name_day: Regex,
    weekday: Regex,
    clock_time: Regex,
    meridiem_time: Regex,
    at_hour: Regex,
    interval: Regex,
}

impl Patterns {
    fn build() -> Result<Self, regex::Error> {
        let months = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec";
        let long_units = "seconds?|minutes?|hours?|days?|weeks?|months?";
        let short_units = "seconds?|secs?|minutes?|mins?|months?|hours?|hrs?|h|days?|d|weeks?|w|m";
        Ok(Patterns {
            relative: Regex::new(r"\bin\s+(.+)$")?,
            duration_part: Regex::new(&format!(
                r"\b(?:(\d+)\s*({short_units})|(half an?|{NUMBER})\s+({long_units}))\b"
            ))?,
            compact: Regex::new(r"\b((?:\d+[smhdw])+)\b")?,
            iso_date: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b")?,
            dotted_date: Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})?")?,
            day_month_name: Regex::new(&format!(
                r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({months})\b"
            ))?,
            month_name_day: Regex::new(&format!(
                r"\b({months})\s+(\d{{1,2}})(?:st|nd|rd|th)?\b"
            ))?,
            weekday: Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")?,
            clock_time: Regex::new(r"\b(\d{1,2}):(\d{2})\s*(am|pm)?\b")?,
            meridiem_time: Regex::new(r"\b(\d{1,2})\s*(am|pm)\b")?,
            at_hour: Regex::new(r"\bat\s+(\d{1,2})(?:\s|$)")?,
            interval: Regex::new(&format!(
                r"(?:\b({NUMBER})\s*)?\b(seconds?|minutes?|hours?|days?|weeks?)\b"
            ))?,
        })
    }
}

fn patterns() -> Result<&'static Patterns> {
    static PATTERNS: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(Patterns::build)
        .as_ref()
        .map_err(|e| anyhow!("invalid time pattern: {e}"))
}

/// Parse a point in time out of free text.
///
/// Unless `raw` is set, results closer than five minutes (or in the past) become "in one
/// hour", and a bare date at local midnight is moved to 09:00 unless midnight was asked for.
pub fn parse_time(
    text: &str,
    timezone: Option<&str>,
    now: DateTime<Utc>,
    raw: bool,
) -> Result<DateTime<Utc>> {
    let p = patterns()?;
    let tz = parse_timezone(timezone);
    let cleaned = strip_reply(text)
        .to_lowercase()
        .replace([',', '#', ';'], " ");

    let mut parsed = match relative_offset(p, &cleaned) {
        Some(offset) => now
            .checked_add_signed(offset)
            .ok_or_else(|| anyhow!("relative time is out of range"))?,
        None => absolute_time(p, &cleaned, tz, now)?,
    };

    if !raw {
        if parsed - now <= Duration::minutes(5) {
            parsed = now + Duration::hours(1);
        }

        let local = parsed.with_timezone(&tz);
        let explicit_midnight = ["00:00", "12am", "12 am", "24:00", "midnight"]
            .iter()
            .any(|marker| cleaned.contains(marker));
        if (local.hour(), local.minute()) == (0, 0) && !explicit_midnight {
            parsed = parsed
                .checked_add_signed(Duration::hours(9))
                .ok_or_else(|| anyhow!("date is out of range"))?;
        }
    }

    Ok(parsed)
}

/// Extract a repeat interval such as "every 2 days" or "each hour"
pub fn parse_interval(text: &str) -> Option<Duration> {
    let cleaned = strip_reply(text).to_lowercase();
    let caps = patterns().ok()?.interval.captures(&cleaned)?;
    let amount = caps.get(1).map(|m| word_to_number(m.as_str())).unwrap_or(Some(1))?;
    unit_duration(&caps[2], amount)
}

fn word_to_number(word: &str) -> Option<i64> {
    match word {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "eight" => Some(8),
        "nine" => Some(9),
        "ten" => Some(10),
        "eleven" => Some(11),
        "twelve" => Some(12),
        digits => digits.parse().ok(),
    }
}

fn unit_duration(unit: &str, amount: i64) -> Option<Duration> {
    let duration = match unit.trim_end_matches('s') {
        "" | "sec" | "second" => Duration::try_seconds(amount)?,
        "m" | "min" | "minute" => Duration::try_minutes(amount)?,
        "h" | "hr" | "hour" => Duration::try_hours(amount)?,
        "d" | "day" => Duration::try_days(amount)?,
        "w" | "week" => Duration::try_weeks(amount)?,
        "month" => Duration::try_days(amount.checked_mul(30)?)?,
        _ => return None,
    };
    Some(duration)
}

fn relative_offset(p: &Patterns, text: &str) -> Option<Duration> {
    let tail = p.relative.captures(text)?.get(1)?.as_str();

    let mut total = Duration::zero();
    let mut found = false;
    for caps in p.duration_part.captures_iter(tail) {
        let part = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
            (Some(amount), Some(unit), _, _) => amount
                .as_str()
                .parse()
                .ok()
                .and_then(|n| unit_duration(unit.as_str(), n)),
            (_, _, Some(amount), Some(unit)) if amount.as_str().starts_with("half") => {
                unit_duration(unit.as_str(), 1).map(|d| d / 2)
            }
            (_, _, Some(amount), Some(unit)) => {
                word_to_number(amount.as_str()).and_then(|n| unit_duration(unit.as_str(), n))
            }
            _ => None,
        };
        if let Some(part) = part {
            total = total.checked_add(&part)?;
            found = true;
        }
    }

    if !found {
        for caps in p.compact.captures_iter(tail) {
            if let Some(part) = compact_duration(&caps[1]) {
                total = total.checked_add(&part)?;
                found = true;
            }
        }
    }

    (found && total > Duration::zero()).then_some(total)
}

/// `1h30m`, `2d`, `45s`
fn compact_duration(token: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut digits = String::new();
    for ch in token.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        total = total.checked_add(&unit_duration(&ch.to_string(), amount)?)?;
    }
    digits.is_empty().then_some(total)
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// A date without a year that already passed refers to next year
fn future_date(today: NaiveDate, month: u32, day: u32, year: Option<i32>) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

/// Returns the recognised date and the text with the date expression removed
fn extract_date(p: &Patterns, text: &str, today: NaiveDate) -> (Option<NaiveDate>, String) {
    if let Some(caps) = p.iso_date.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        return (date, p.iso_date.replace(text, " ").into_owned());
    }

    if let Some(caps) = p.dotted_date.captures(text) {
        let day = caps[1].parse().unwrap_or(0);
        let month = caps[2].parse().unwrap_or(0);
        let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
        return (
            future_date(today, month, day, year),
            p.dotted_date.replace(text, " ").into_owned(),
        );
    }

    if let Some(caps) = p.day_month_name.captures(text) {
        let date = month_from_name(&caps[2])
            .and_then(|month| future_date(today, month, caps[1].parse().ok()?, None));
        return (date, p.day_month_name.replace(text, " ").into_owned());
    }

    if let Some(caps) = p.month_name_day.captures(text) {
        let date = month_from_name(&caps[1])
            .and_then(|month| future_date(today, month, caps[2].parse().ok()?, None));
        return (date, p.month_name_day.replace(text, " ").into_owned());
    }

    if text.contains("day after tomorrow") {
        return (
            today.succ_opt().and_then(|d| d.succ_opt()),
            text.replace("day after tomorrow", " "),
        );
    }
    if text.contains("tomorrow") {
        return (today.succ_opt(), text.replace("tomorrow", " "));
    }
    if text.contains("today") || text.contains("tonight") {
        return (Some(today), text.to_string());
    }

    if let Some(caps) = p.weekday.captures(text) {
        let weekday: Option<Weekday> = caps[1].parse().ok();
        let date = weekday.and_then(|target| {
            let ahead = (7 + target.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            today.checked_add_signed(Duration::days(if ahead == 0 { 7 } else { ahead }))
        });
        return (date, p.weekday.replace(text, " ").into_owned());
    }

    (None, text.to_string())
}

fn to_24h(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem {
        Some("am") if hour == 12 => Some(0),
        Some("pm") if hour < 12 => Some(hour + 12),
        Some(_) if hour > 12 => None,
        _ => Some(hour),
    }
}

/// Returns the time of day and whether it denotes midnight of the following day (`24:00`)
fn extract_time_of_day(p: &Patterns, text: &str) -> Option<(NaiveTime, bool)> {
    if let Some(caps) = p.clock_time.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        if hour == 24 && minute == 0 {
            return Some((NaiveTime::MIN, true));
        }
        let hour = to_24h(hour, caps.get(3).map(|m| m.as_str()))?;
        return NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, false));
    }

    if let Some(caps) = p.meridiem_time.captures(text) {
        let hour = to_24h(caps[1].parse().ok()?, Some(&caps[2]))?;
        return NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, false));
    }

    if let Some(caps) = p.at_hour.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, false));
    }

    let named = [
        ("afternoon", 15),
        ("midnight", 0),
        ("noon", 12),
        ("morning", 9),
        ("evening", 18),
        ("tonight", 20),
    ];
    named
        .iter()
        .find(|(word, _)| text.contains(word))
        .and_then(|(_, hour)| NaiveTime::from_hms_opt(*hour, 0, 0))
        .map(|t| (t, false))
}

fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    // Local times inside a DST gap are shifted past the gap
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

fn absolute_time(p: &Patterns, text: &str, tz: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    let (date, remainder) = extract_date(p, text, today);
    let time = extract_time_of_day(p, &remainder);

    if date.is_none() && time.is_none() {
        return Err(anyhow!("no date or time found in message"));
    }

    let (time_of_day, next_day) = time.unwrap_or((NaiveTime::MIN, false));
    let mut day = date.unwrap_or(today);
    if next_day {
        day = day
            .succ_opt()
            .ok_or_else(|| anyhow!("date out of range"))?;
    }

    let mut parsed = localize(tz, day.and_time(time_of_day))
        .ok_or_else(|| anyhow!("time does not exist in timezone {tz}"))?;

    if date.is_none() && parsed <= now {
        let next_day = day
            .succ_opt()
            .ok_or_else(|| anyhow!("date out of range"))?;
        parsed = localize(tz, next_day.and_time(time_of_day))
            .ok_or_else(|| anyhow!("time does not exist in timezone {tz}"))?;
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2026, 6, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_offsets() {
        assert_eq!(
            parse_time("call mom in 2 hours", None, now(), false).unwrap(),
            now() + Duration::hours(2)
        );
        assert_eq!(
            parse_time("in an hour and 30 minutes", None, now(), false).unwrap(),
            now() + Duration::minutes(90)
        );
        assert_eq!(
            parse_time("stretch in half an hour", None, now(), false).unwrap(),
            now() + Duration::minutes(30)
        );
        assert_eq!(
            parse_time("tea in 1h30m", None, now(), false).unwrap(),
            now() + Duration::minutes(90)
        );
    }

    #[test]
    fn test_near_future_becomes_one_hour() {
        assert_eq!(
            parse_time("in 2 minutes", None, now(), false).unwrap(),
            now() + Duration::hours(1)
        );
        assert_eq!(
            parse_time("in 2 minutes", None, now(), true).unwrap(),
            now() + Duration::minutes(2)
        );
    }

    #[test]
    fn test_time_of_day_rolls_to_tomorrow_when_passed() {
        let parsed = parse_time("standup at 9", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 11, 9, 0, 0).unwrap());

        let parsed = parse_time("lunch 14:30", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 10, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_timezone_is_applied() {
        // 15:00 in Berlin (CEST) is 13:00 UTC
        let parsed = parse_time("meeting at 3pm", Some("Europe/Berlin"), now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 10, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_bare_date_defaults_to_nine() {
        let parsed = parse_time("laundry tomorrow", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 11, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_explicit_midnight_is_kept() {
        let parsed = parse_time("laundry on sunday 12am", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_weekday_is_always_in_the_future() {
        let parsed = parse_time("wednesday 8:00", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 6, 17, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_dates() {
        let parsed = parse_time("dentist 24.12.2026 14:30", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 12, 24, 14, 30, 0).unwrap());

        let parsed = parse_time("dentist 2.3. at 8", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2027, 3, 2, 8, 0, 0).unwrap());

        let parsed = parse_time("party on july 4th at 6pm", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 7, 4, 18, 0, 0).unwrap());

        let parsed = parse_time("trip 1st of august", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap());

        let parsed = parse_time("release 2026-09-01 10:15", None, now(), false).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 9, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn test_no_time_is_an_error() {
        assert!(parse_time("buy milk", None, now(), false).is_err());
        assert!(parse_time("", None, now(), false).is_err());
    }

    #[test]
    fn test_reply_quote_is_ignored() {
        let parsed = parse_time("> in 5 days\nin 3 hours", None, now(), false).unwrap();
        assert_eq!(parsed, now() + Duration::hours(3));
    }

    #[test]
    fn test_raw_time_for_daily_reminder() {
        let parsed = parse_time("daily reminder at 9am", Some("Europe/Berlin"), now(), true)
            .unwrap()
            .with_timezone(&chrono_tz::Europe::Berlin);
        assert_eq!((parsed.hour(), parsed.minute()), (9, 0));
    }

    #[test]
    fn test_huge_offsets_are_errors() {
        assert!(parse_time("water in 100000000 days", None, now(), false).is_err());
        assert!(parse_time("water in 9999999999 weeks", None, now(), false).is_err());
        assert!(parse_time("water in 200000000d", None, now(), false).is_err());
        assert!(parse_time(
            "water in 90000000 days and 90000000 days",
            None,
            now(),
            false
        )
        .is_err());
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("repeat every 2 days"), Some(Duration::days(2)));
        assert_eq!(parse_interval("each hour"), Some(Duration::hours(1)));
        assert_eq!(parse_interval("every ten minutes"), Some(Duration::minutes(10)));
        assert_eq!(parse_interval("always"), None);
    }
}
