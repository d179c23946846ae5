//! iCalendar rendering of a channel's reminders

use chrono::{DateTime, Duration, Utc};

use crate::database::Reminder;

const ICAL_TIME: &str = "%Y%m%dT%H%M%SZ";

fn ical_time(time: DateTime<Utc>) -> String {
    time.format(ICAL_TIME).to_string()
}

/// Escape a TEXT value (RFC 5545, 3.3.11)
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

/// Recurrence rule for a repeating reminder, counting the occurrences still ahead
fn recurrence_rule(reminder: &Reminder) -> Option<String> {
    if reminder.repeat_interval <= 0 {
        return None;
    }
    let minutes = reminder.repeat_interval;
    let (freq, interval) = if minutes % 1440 == 0 {
        ("DAILY", minutes / 1440)
    } else if minutes % 60 == 0 {
        ("HOURLY", minutes / 60)
    } else {
        ("MINUTELY", minutes)
    };
    let remaining = (reminder.repeat_max - reminder.repeated).max(1);
    Some(format!("FREQ={freq};INTERVAL={interval};COUNT={remaining}"))
}

/// Render active reminders as a `VCALENDAR` document
pub fn render_icalendar(reminders: &[Reminder]) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:RemindMe".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    for reminder in reminders.iter().filter(|r| r.active) {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:remindme-{}", reminder.id));
        lines.push(format!("DTSTAMP:{}", ical_time(reminder.created_at)));
        lines.push(format!("DTSTART:{}", ical_time(reminder.remind_at)));
        lines.push(format!(
            "DTEND:{}",
            ical_time(reminder.remind_at + Duration::minutes(5))
        ));
        if let Some(rule) = recurrence_rule(reminder) {
            lines.push(format!("RRULE:{rule}"));
        }
        lines.push(format!("SUMMARY:{}", escape(&reminder.message)));
        lines.push(format!("DESCRIPTION:{}", escape(&reminder.message)));
        lines.push("CLASS:PRIVATE".to_string());
        lines.push("END:VEVENT".to_string());
    }

    lines.push("END:VCALENDAR".to_string());
    let mut calendar = lines.join("\r\n");
    calendar.push_str("\r\n");
    calendar
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reminder(id: i64, message: &str, interval: i64, max: i64) -> Reminder {
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 18, 30, 0).unwrap();
        Reminder {
            id,
            channel_id: 1,
            message: message.to_string(),
            remind_at: at,
            active: true,
            repeat_interval: interval,
            repeat_max: max,
            repeated: 0,
            created_at: at - Duration::days(1),
            resource_id: None,
        }
    }

    #[test]
    fn test_render_single_event() {
        let calendar = render_icalendar(&[reminder(7, "Buy milk, eggs", 0, 0)]);

        assert!(calendar.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:RemindMe\r\n"));
        assert!(calendar.contains("UID:remindme-7\r\n"));
        assert!(calendar.contains("DTSTART:20260401T183000Z\r\n"));
        assert!(calendar.contains("DTEND:20260401T183500Z\r\n"));
        assert!(calendar.contains("SUMMARY:Buy milk\\, eggs\r\n"));
        assert!(!calendar.contains("RRULE"));
        assert!(calendar.ends_with("END:VEVENT\r\nEND:VCALENDAR\r\n"));
    }

    #[test]
    fn test_recurrence_rules() {
        assert_eq!(
            recurrence_rule(&reminder(1, "x", 2880, 5)).as_deref(),
            Some("FREQ=DAILY;INTERVAL=2;COUNT=5")
        );
        assert_eq!(
            recurrence_rule(&reminder(1, "x", 180, 3)).as_deref(),
            Some("FREQ=HOURLY;INTERVAL=3;COUNT=3")
        );
        assert_eq!(
            recurrence_rule(&reminder(1, "x", 90, 4)).as_deref(),
            Some("FREQ=MINUTELY;INTERVAL=90;COUNT=4")
        );
    }

    #[test]
    fn test_inactive_reminders_are_left_out() {
        let mut done = reminder(2, "done", 0, 0);
        done.active = false;
        let calendar = render_icalendar(&[done]);
        assert!(!calendar.contains("BEGIN:VEVENT"));
    }
}
