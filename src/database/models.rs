//! Row types shared by the store, the dispatcher and the scheduler.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

/// Permission level of a channel owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// Semantic type of a recorded message
///
/// Reaction and reply actions are keyed by this type, so the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ReminderRequest,
    ReminderSuccess,
    ReminderFail,
    /// A reminder that fired
    Reminder,
    /// A user's reply moving a reminder
    ReminderUpdate,
    ReminderUpdateSuccess,
    ReminderUpdateFail,
    ReminderDelete,
    ReminderDeleteSuccess,
    ReminderDeleteFail,
    /// A user's reply making a reminder recurring
    ReminderRecurringRequest,
    ReminderRecurringSuccess,
    ReminderRecurringFail,
    ReminderList,
    Commands,
    /// Daily digest
    DailyReminder,
    DailyReminderUpdate,
    DailyReminderUpdateSuccess,
    DailyReminderUpdateFail,
    DailyReminderDelete,
    DailyReminderDeleteSuccess,
    DailyReminderDeleteFail,
    TimezoneChangeRequest,
    TimezoneChangeSuccess,
    TimezoneChangeFail,
    IcalLinkRequest,
    IcalLink,
    IcalRenewRequest,
    IcalRenew,
    /// A user subscribing the channel to an external calendar
    IcalImportRequest,
    IcalImportSuccess,
    IcalImportFail,
    AddUser,
    /// Sent but intentionally not recorded
    DoNotSave,
}

impl MessageType {
    pub const ALL: [MessageType; 34] = [
        MessageType::ReminderRequest,
        MessageType::ReminderSuccess,
        MessageType::ReminderFail,
        MessageType::Reminder,
        MessageType::ReminderUpdate,
        MessageType::ReminderUpdateSuccess,
        MessageType::ReminderUpdateFail,
        MessageType::ReminderDelete,
        MessageType::ReminderDeleteSuccess,
        MessageType::ReminderDeleteFail,
        MessageType::ReminderRecurringRequest,
        MessageType::ReminderRecurringSuccess,
        MessageType::ReminderRecurringFail,
        MessageType::ReminderList,
        MessageType::Commands,
        MessageType::DailyReminder,
        MessageType::DailyReminderUpdate,
        MessageType::DailyReminderUpdateSuccess,
        MessageType::DailyReminderUpdateFail,
        MessageType::DailyReminderDelete,
        MessageType::DailyReminderDeleteSuccess,
        MessageType::DailyReminderDeleteFail,
        MessageType::TimezoneChangeRequest,
        MessageType::TimezoneChangeSuccess,
        MessageType::TimezoneChangeFail,
        MessageType::IcalLinkRequest,
        MessageType::IcalLink,
        MessageType::IcalRenewRequest,
        MessageType::IcalRenew,
        MessageType::IcalImportRequest,
        MessageType::IcalImportSuccess,
        MessageType::IcalImportFail,
        MessageType::AddUser,
        MessageType::DoNotSave,
    ];

    /// Types whose replies reschedule the attached reminder when no reply action matches
    pub const WITH_REMINDER: [MessageType; 6] = [
        MessageType::ReminderRequest,
        MessageType::ReminderSuccess,
        MessageType::Reminder,
        MessageType::ReminderUpdateSuccess,
        MessageType::ReminderRecurringRequest,
        MessageType::ReminderRecurringSuccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ReminderRequest => "REMINDER_REQUEST",
            MessageType::ReminderSuccess => "REMINDER_SUCCESS",
            MessageType::ReminderFail => "REMINDER_FAIL",
            MessageType::Reminder => "REMINDER",
            MessageType::ReminderUpdate => "REMINDER_UPDATE",
            MessageType::ReminderUpdateSuccess => "REMINDER_UPDATE_SUCCESS",
            MessageType::ReminderUpdateFail => "REMINDER_UPDATE_FAIL",
            MessageType::ReminderDelete => "REMINDER_DELETE",
            MessageType::ReminderDeleteSuccess => "REMINDER_DELETE_SUCCESS",
            MessageType::ReminderDeleteFail => "REMINDER_DELETE_FAIL",
            MessageType::ReminderRecurringRequest => "REMINDER_RECURRING_REQUEST",
            MessageType::ReminderRecurringSuccess => "REMINDER_RECURRING_SUCCESS",
            MessageType::ReminderRecurringFail => "REMINDER_RECURRING_FAIL",
            MessageType::ReminderList => "REMINDER_LIST",
            MessageType::Commands => "COMMANDS",
            MessageType::DailyReminder => "DAILY_REMINDER",
            MessageType::DailyReminderUpdate => "DAILY_REMINDER_UPDATE",
            MessageType::DailyReminderUpdateSuccess => "DAILY_REMINDER_UPDATE_SUCCESS",
            MessageType::DailyReminderUpdateFail => "DAILY_REMINDER_UPDATE_FAIL",
            MessageType::DailyReminderDelete => "DAILY_REMINDER_DELETE",
            MessageType::DailyReminderDeleteSuccess => "DAILY_REMINDER_DELETE_SUCCESS",
            MessageType::DailyReminderDeleteFail => "DAILY_REMINDER_DELETE_FAIL",
            MessageType::TimezoneChangeRequest => "TIMEZONE_CHANGE_REQUEST",
            MessageType::TimezoneChangeSuccess => "TIMEZONE_CHANGE_REQUEST_SUCCESS",
            MessageType::TimezoneChangeFail => "TIMEZONE_CHANGE_REQUEST_FAIL",
            MessageType::IcalLinkRequest => "ICAL_LINK_REQUEST",
            MessageType::IcalLink => "ICAL_LINK",
            MessageType::IcalRenewRequest => "ICAL_RENEW_REQUEST",
            MessageType::IcalRenew => "ICAL_RENEW",
            MessageType::IcalImportRequest => "ICAL_IMPORT_REQUEST",
            MessageType::IcalImportSuccess => "ICAL_IMPORT_SUCCESS",
            MessageType::IcalImportFail => "ICAL_IMPORT_FAIL",
            MessageType::AddUser => "ADD_USER",
            MessageType::DoNotSave => "DO_NOT_SAVE",
        }
    }

    pub fn carries_reminder(&self) -> bool {
        Self::WITH_REMINDER.contains(self)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        MessageType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Invalid message type: {}", s))
    }
}

/// Kind of an external source reminders are imported from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Ical,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ical => "ICAL",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ICAL" => Ok(ResourceKind::Ical),
            _ => Err(anyhow::anyhow!("Invalid resource kind: {}", s)),
        }
    }
}

/// An external calendar a channel is subscribed to
#[derive(Debug, Clone, PartialEq)]
pub struct ThirdPartyResource {
    pub id: i64,
    pub channel_id: i64,
    pub kind: ResourceKind,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation the bot takes part in, owned by one user
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    /// Transport-level conversation id
    pub channel_identifier: String,
    pub user_identifier: String,
    pub timezone: Option<String>,
    /// Minutes since local midnight, `None` disables the digest
    pub daily_reminder: Option<u32>,
    pub calendar_secret: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: i64,
    pub channel_id: i64,
    pub message: String,
    pub remind_at: DateTime<Utc>,
    pub active: bool,
    /// Minutes between occurrences, 0 for one-off reminders
    pub repeat_interval: i64,
    /// Total number of occurrences for repeating reminders
    pub repeat_max: i64,
    pub repeated: i64,
    pub created_at: DateTime<Utc>,
    /// Imported from this third party resource, `None` for reminders created in chat
    pub resource_id: Option<i64>,
}

impl Reminder {
    pub fn repeat_interval(&self) -> Duration {
        Duration::try_minutes(self.repeat_interval).unwrap_or_else(Duration::zero)
    }

    /// Whether more occurrences are scheduled after the current one
    pub fn repeats(&self) -> bool {
        self.repeat_interval > 0 && self.repeated + 1 < self.repeat_max
    }

    pub fn icons(&self) -> Vec<&'static str> {
        let mut icons = Vec::new();
        if self.repeats() {
            icons.push("🔄");
        }
        icons
    }

    /// State after this occurrence fired.
    ///
    /// Repeating reminders move to the next occurrence that lies after `now` and count one
    /// occurrence; the last occurrence (or a one-off reminder) deactivates.
    pub fn after_fire(&self, now: DateTime<Utc>) -> Reminder {
        let mut next = self.clone();
        if self.repeat_interval <= 0 {
            next.active = false;
            return next;
        }

        next.repeated += 1;
        let following = self
            .next_occurrence_after(self.repeat_interval(), now.max(self.remind_at))
            .filter(|_| next.repeated < self.repeat_max);
        match following {
            Some(at) => next.remind_at = at,
            // Last occurrence, or the schedule left the representable range
            None => next.active = false,
        }
        next
    }

    /// First time on this reminder's schedule that lies after `now`, stepping by `interval`.
    /// `None` if the schedule runs past the representable range.
    pub fn next_occurrence_after(
        &self,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.remind_at > now {
            return Some(self.remind_at);
        }
        if interval <= Duration::zero() {
            return None;
        }
        let behind = (now - self.remind_at).num_seconds() / interval.num_seconds().max(1) + 1;
        let step = interval.checked_mul(i32::try_from(behind).ok()?)?;
        let next = self.remind_at.checked_add_signed(step)?;
        if next > now {
            Some(next)
        } else {
            next.checked_add_signed(interval)
        }
    }
}

/// A recorded protocol event, used to resolve reply chains and reaction targets
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub external_id: String,
    pub channel_id: i64,
    pub reminder_id: Option<i64>,
    pub body: String,
    pub body_html: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

/// Message about to be recorded
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub external_id: String,
    pub channel_id: i64,
    pub reminder_id: Option<i64>,
    pub body: String,
    pub body_html: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}
