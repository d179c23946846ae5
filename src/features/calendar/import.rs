//! # Calendar Import Parsing
//!
//! Reads the events of a subscribed iCalendar feed. Covers what calendar providers emit
//! for plain events: folded lines, escaped text, UTC, floating, zoned and all-day start
//! times, and recurrence rules stepping by a fixed frequency.
//!
//! Rules using `BYxxx` parts are only accepted when they restate the start date
//! (`FREQ=WEEKLY;BYDAY=MO` for an event starting on a Monday); other expansions are not
//! supported and the event is skipped.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.0.0: Initial VEVENT and RRULE parsing

use anyhow::{anyhow, bail, Result};
use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use log::debug;

/// Upper bound of calendar-month steps searched for the next occurrence
const MAX_MONTH_STEPS: u32 = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn parse(value: &str) -> Result<Self> {
        match value.to_uppercase().as_str() {
            "MINUTELY" => Ok(Frequency::Minutely),
            "HOURLY" => Ok(Frequency::Hourly),
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(anyhow!("unsupported frequency {other}")),
        }
    }
}

/// A simple recurrence rule
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
}

/// Start of an event in the zone it was written in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventStart {
    pub local: NaiveDateTime,
    pub zone: Tz,
}

impl EventStart {
    pub fn utc(&self) -> DateTime<Utc> {
        localize(self.zone, self.local)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedEvent {
    pub uid: String,
    /// The description, or the summary when the description is empty
    pub name: String,
    pub start: EventStart,
    pub recurrence: Option<Recurrence>,
}

impl ImportedEvent {
    /// First occurrence at or after `threshold`
    pub fn first_start_from(&self, threshold: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let Some(rule) = &self.recurrence else {
            let start = self.start.utc();
            return (start >= threshold).then_some(start);
        };

        match fixed_step(rule) {
            Some(step) => self.first_fixed_step(rule, step, threshold),
            None => self.first_month_step(rule, threshold),
        }
    }

    fn first_fixed_step(
        &self,
        rule: &Recurrence,
        step: TimeDelta,
        threshold: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let start = self.start.utc();
        let behind = (threshold - start).num_seconds();
        // Local stepping can drift by a DST shift, so start one step early
        let mut n = (behind / step.num_seconds().max(1) - 1).max(0);

        for _ in 0..16 {
            if rule.count.is_some_and(|count| n >= i64::from(count)) {
                return None;
            }
            let offset = step.checked_mul(i32::try_from(n).ok()?)?;
            let occurrence = match rule.frequency {
                Frequency::Minutely | Frequency::Hourly => start.checked_add_signed(offset)?,
                _ => localize(self.start.zone, self.start.local.checked_add_signed(offset)?),
            };
            if rule.until.is_some_and(|until| occurrence > until) {
                return None;
            }
            if occurrence >= threshold {
                return Some(occurrence);
            }
            n += 1;
        }
        None
    }

    fn first_month_step(&self, rule: &Recurrence, threshold: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = match rule.frequency {
            Frequency::Yearly => rule.interval.checked_mul(12)?,
            _ => rule.interval,
        };
        let mut seen = 0u32;

        for n in 0..MAX_MONTH_STEPS {
            let local = self
                .start
                .local
                .checked_add_months(Months::new(months.checked_mul(n)?))?;
            // Months without the start day have no occurrence
            if local.day() != self.start.local.day() {
                continue;
            }
            seen += 1;
            if rule.count.is_some_and(|count| seen > count) {
                return None;
            }
            let occurrence = localize(self.start.zone, local);
            if rule.until.is_some_and(|until| occurrence > until) {
                return None;
            }
            if occurrence >= threshold {
                return Some(occurrence);
            }
        }
        None
    }
}

fn fixed_step(rule: &Recurrence) -> Option<TimeDelta> {
    let interval = i64::from(rule.interval);
    match rule.frequency {
        Frequency::Minutely => TimeDelta::try_minutes(interval),
        Frequency::Hourly => TimeDelta::try_hours(interval),
        Frequency::Daily => TimeDelta::try_days(interval),
        Frequency::Weekly => TimeDelta::try_weeks(interval),
        Frequency::Monthly | Frequency::Yearly => None,
    }
}

/// Resolve a wall-clock time, moving times inside a DST gap by the gap's offset
fn localize(zone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match zone.from_local_datetime(&local).earliest() {
        Some(time) => time.with_timezone(&Utc),
        None => zone.from_utc_datetime(&local).with_timezone(&Utc),
    }
}

/// One content line split into name, parameters and value
struct Property {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl Property {
    fn parse(line: &str) -> Option<Self> {
        let mut quoted = false;
        let split = line.char_indices().find_map(|(i, c)| {
            match c {
                '"' => quoted = !quoted,
                ':' if !quoted => return Some(i),
                _ => {}
            }
            None
        })?;
        let (head, value) = (&line[..split], &line[split + 1..]);

        let mut parts = head.split(';');
        let name = parts.next()?.trim().to_uppercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_uppercase(), v.trim_matches('"').to_string()))
            .collect();

        Some(Property {
            name,
            params,
            value: value.to_string(),
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Join folded continuation lines
fn unfold(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match (line.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(rest), Some(last)) => last.push_str(rest),
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a DATE or DATE-TIME value; floating times use `fallback`
fn parse_date_time(value: &str, tzid: Option<&str>, fallback: Tz) -> Result<EventStart> {
    let value = value.trim();
    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")?;
        let local = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date {value}"))?;
        return Ok(EventStart { local, zone: fallback });
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let local = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")?;
        return Ok(EventStart { local, zone: Tz::UTC });
    }

    let local = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")?;
    let zone = match tzid.map(|id| id.parse::<Tz>()) {
        Some(Ok(zone)) => zone,
        Some(Err(_)) => {
            debug!("Unknown TZID {tzid:?}, using {fallback}");
            fallback
        }
        None => fallback,
    };
    Ok(EventStart { local, zone })
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse an RRULE value relative to the event's start
pub fn parse_rrule(value: &str, start: &EventStart) -> Result<Recurrence> {
    let mut frequency = None;
    let mut rule = Recurrence {
        frequency: Frequency::Daily,
        interval: 1,
        count: None,
        until: None,
    };

    for part in value.split(';').filter(|p| !p.is_empty()) {
        let (key, val) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed rule part {part}"))?;
        let val = val.trim().to_uppercase();
        match key.trim().to_uppercase().as_str() {
            "FREQ" => frequency = Some(Frequency::parse(&val)?),
            "INTERVAL" => rule.interval = val.parse()?,
            "COUNT" => rule.count = Some(val.parse()?),
            "UNTIL" => rule.until = Some(parse_date_time(&val, None, start.zone)?.utc()),
            "WKST" => {}
            "BYDAY" if parse_weekday(&val) == Some(start.local.weekday()) => {}
            "BYMONTHDAY" if val.parse::<u32>().ok() == Some(start.local.day()) => {}
            "BYMONTH" if val.parse::<u32>().ok() == Some(start.local.month()) => {}
            other => bail!("unsupported rule part {other}={val}"),
        }
    }

    rule.frequency = frequency.ok_or_else(|| anyhow!("rule without FREQ"))?;
    if rule.interval == 0 {
        bail!("rule with INTERVAL=0");
    }
    Ok(rule)
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<Property>,
    rrule: Option<String>,
    cancelled: bool,
    is_override: bool,
}

impl EventBuilder {
    fn build(self, fallback: Tz) -> Result<ImportedEvent> {
        if self.cancelled {
            bail!("event is cancelled");
        }
        if self.is_override {
            bail!("event overrides a single occurrence");
        }
        let uid = self.uid.ok_or_else(|| anyhow!("event without UID"))?;
        let start = self.start.ok_or_else(|| anyhow!("event {uid} without DTSTART"))?;
        let start = parse_date_time(&start.value, start.param("TZID"), fallback)?;
        let recurrence = self
            .rrule
            .map(|rule| parse_rrule(&rule, &start))
            .transpose()?;

        let name = [self.description, self.summary]
            .into_iter()
            .flatten()
            .map(|text| unescape(text.trim()))
            .find(|text| !text.is_empty())
            .unwrap_or_default();

        Ok(ImportedEvent {
            uid,
            name,
            start,
            recurrence,
        })
    }
}

/// Events of an iCalendar document. Events that cannot be read are logged and skipped.
pub fn parse_events(content: &str, fallback: Tz) -> Result<Vec<ImportedEvent>> {
    let lines = unfold(content);
    if !lines
        .iter()
        .any(|l| l.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        bail!("not an iCalendar document");
    }

    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;
    // Depth of components nested inside the current event, such as VALARM
    let mut nested = 0usize;

    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let Some(property) = Property::parse(line) else {
            continue;
        };
        let name = property.name.clone();
        let value = property.value.trim().to_uppercase();

        match (name.as_str(), current.as_mut()) {
            ("BEGIN", None) if value == "VEVENT" => current = Some(EventBuilder::default()),
            ("BEGIN", Some(_)) => nested += 1,
            ("END", Some(_)) if nested > 0 => nested -= 1,
            ("END", Some(_)) if value == "VEVENT" => {
                if let Some(builder) = current.take() {
                    match builder.build(fallback) {
                        Ok(event) => events.push(event),
                        Err(e) => debug!("Skipping event: {e}"),
                    }
                }
            }
            (_, Some(_)) if nested > 0 => {}
            ("UID", Some(event)) => event.uid = Some(property.value.trim().to_string()),
            ("SUMMARY", Some(event)) => event.summary = Some(property.value),
            ("DESCRIPTION", Some(event)) => event.description = Some(property.value),
            ("DTSTART", Some(event)) => event.start = Some(property),
            ("RRULE", Some(event)) => event.rrule = Some(property.value),
            ("STATUS", Some(event)) => event.cancelled = value == "CANCELLED",
            ("RECURRENCE-ID", Some(event)) => event.is_override = true,
            _ => {}
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> Tz {
        "Europe/Berlin".parse().unwrap()
    }

    fn calendar(events: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{events}END:VCALENDAR\r\n")
    }

    fn single(body: &str) -> ImportedEvent {
        let content = calendar(&format!("BEGIN:VEVENT\r\n{body}END:VEVENT\r\n"));
        let mut events = parse_events(&content, Tz::UTC).unwrap();
        assert_eq!(events.len(), 1, "expected one event in {content}");
        events.remove(0)
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parses_folded_escaped_event() {
        let event = single(
            "UID:abc-123\r\nDTSTART:20260301T090000Z\r\nSUMMARY:Team\r\n  sync\\, weekly\r\n",
        );
        assert_eq!(event.uid, "abc-123");
        assert_eq!(event.name, "Team sync, weekly");
        assert_eq!(event.start.utc(), utc(2026, 3, 1, 9, 0));
        assert_eq!(event.recurrence, None);
    }

    #[test]
    fn test_description_wins_over_summary() {
        let event = single(
            "UID:abc\r\nDTSTART:20260301T090000Z\r\nSUMMARY:Title\r\nDESCRIPTION:Details\\nmore\r\n",
        );
        assert_eq!(event.name, "Details\nmore");

        let empty = single("UID:abc\r\nDTSTART:20260301T090000Z\r\nSUMMARY:Title\r\nDESCRIPTION:\r\n");
        assert_eq!(empty.name, "Title");
    }

    #[test]
    fn test_start_time_forms() {
        let content = calendar(
            "BEGIN:VEVENT\nUID:zoned\nDTSTART;TZID=Europe/Berlin:20260301T090000\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:floating\nDTSTART:20260301T090000\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:allday\nDTSTART;VALUE=DATE:20260301\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:windows\nDTSTART;TZID=\"W. Europe Standard Time\":20260301T090000\nEND:VEVENT\n",
        );
        let events = parse_events(&content, berlin()).unwrap();
        let starts: Vec<_> = events.iter().map(|e| (e.uid.as_str(), e.start.utc())).collect();
        assert_eq!(
            starts,
            vec![
                ("zoned", utc(2026, 3, 1, 8, 0)),
                ("floating", utc(2026, 3, 1, 8, 0)),
                ("allday", utc(2026, 2, 28, 23, 0)),
                ("windows", utc(2026, 3, 1, 8, 0)),
            ]
        );
    }

    #[test]
    fn test_skips_unreadable_cancelled_and_alarm_content() {
        let content = calendar(
            "BEGIN:VEVENT\nUID:ok\nDTSTART:20260301T090000Z\nSUMMARY:Kept\n\
             BEGIN:VALARM\nDESCRIPTION:Alarm text\nTRIGGER:-PT15M\nEND:VALARM\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:nostart\nSUMMARY:No start\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:gone\nDTSTART:20260301T090000Z\nSTATUS:CANCELLED\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:ok\nRECURRENCE-ID:20260308T090000Z\nDTSTART:20260308T100000Z\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:byday\nDTSTART:20260301T090000Z\nRRULE:FREQ=WEEKLY;BYDAY=MO,WE\nEND:VEVENT\n\
             BEGIN:VTODO\nUID:todo\nDTSTART:20260301T090000Z\nEND:VTODO\n",
        );
        let events = parse_events(&content, Tz::UTC).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Kept");
    }

    #[test]
    fn test_rejects_non_calendar_content() {
        assert!(parse_events("<html>not found</html>", Tz::UTC).is_err());
    }

    #[test]
    fn test_one_off_event_is_upcoming_until_it_starts() {
        let event = single("UID:once\nDTSTART:20260301T090000Z\n");
        assert_eq!(event.first_start_from(utc(2026, 3, 1, 8, 0)), Some(utc(2026, 3, 1, 9, 0)));
        assert_eq!(event.first_start_from(utc(2026, 3, 1, 9, 0)), Some(utc(2026, 3, 1, 9, 0)));
        assert_eq!(event.first_start_from(utc(2026, 3, 1, 9, 1)), None);
    }

    #[test]
    fn test_weekly_rule_keeps_wall_clock_across_dst() {
        let content = calendar(
            "BEGIN:VEVENT\nUID:weekly\nDTSTART;TZID=Europe/Berlin:20260302T090000\n\
             RRULE:FREQ=WEEKLY;BYDAY=MO;INTERVAL=2\nEND:VEVENT\n",
        );
        let event = parse_events(&content, Tz::UTC).unwrap().remove(0);

        // 2026-03-02 is a Monday; DST starts on 2026-03-29
        assert_eq!(event.first_start_from(utc(2026, 3, 3, 0, 0)), Some(utc(2026, 3, 16, 8, 0)));
        assert_eq!(event.first_start_from(utc(2026, 3, 17, 0, 0)), Some(utc(2026, 3, 30, 7, 0)));
    }

    #[test]
    fn test_count_and_until_end_a_rule() {
        let counted = single("UID:c\nDTSTART:20260301T090000Z\nRRULE:FREQ=DAILY;COUNT=3\n");
        assert_eq!(counted.first_start_from(utc(2026, 3, 3, 0, 0)), Some(utc(2026, 3, 3, 9, 0)));
        assert_eq!(counted.first_start_from(utc(2026, 3, 3, 10, 0)), None);

        let until = single("UID:u\nDTSTART:20260301T090000Z\nRRULE:FREQ=HOURLY;INTERVAL=6;UNTIL=20260302T000000Z\n");
        assert_eq!(until.first_start_from(utc(2026, 3, 1, 16, 0)), Some(utc(2026, 3, 1, 21, 0)));
        assert_eq!(until.first_start_from(utc(2026, 3, 1, 22, 0)), None);
    }

    #[test]
    fn test_monthly_and_yearly_rules_skip_missing_days() {
        let monthly = single("UID:m\nDTSTART:20260131T120000Z\nRRULE:FREQ=MONTHLY\n");
        assert_eq!(monthly.first_start_from(utc(2026, 2, 1, 0, 0)), Some(utc(2026, 3, 31, 12, 0)));

        let leap = single("UID:y\nDTSTART:20240229T080000Z\nRRULE:FREQ=YEARLY;COUNT=3\n");
        assert_eq!(leap.first_start_from(utc(2024, 3, 1, 0, 0)), Some(utc(2028, 2, 29, 8, 0)));
        assert_eq!(leap.first_start_from(utc(2028, 3, 1, 0, 0)), Some(utc(2032, 2, 29, 8, 0)));
        assert_eq!(leap.first_start_from(utc(2032, 3, 1, 0, 0)), None);
    }

    #[test]
    fn test_long_running_rule_far_in_the_past() {
        let event = single("UID:old\nDTSTART:19900101T073000Z\nRRULE:FREQ=MINUTELY;INTERVAL=30\n");
        assert_eq!(event.first_start_from(utc(2026, 3, 1, 8, 10)), Some(utc(2026, 3, 1, 8, 30)));
    }
}
