use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use sqlite::{State, Statement};

use super::{from_timestamp, last_insert_id, Database, Reminder};

const REMINDER_COLUMNS: &str = "r.id, r.channel_id, r.message, r.remind_at, r.active, \
     r.repeat_interval, r.repeat_max, r.repeated, r.created_at, r.resource_id";

fn read_reminder(statement: &Statement<'_>) -> Result<Reminder> {
    Ok(Reminder {
        id: statement.read::<i64, _>("id")?,
        channel_id: statement.read::<i64, _>("channel_id")?,
        message: statement.read::<String, _>("message")?,
        remind_at: from_timestamp(statement.read::<i64, _>("remind_at")?)?,
        active: statement.read::<i64, _>("active")? != 0,
        repeat_interval: statement.read::<i64, _>("repeat_interval")?,
        repeat_max: statement.read::<i64, _>("repeat_max")?,
        repeated: statement.read::<i64, _>("repeated")?,
        created_at: from_timestamp(statement.read::<i64, _>("created_at")?)?,
        resource_id: statement.read::<Option<i64>, _>("resource_id")?,
    })
}

fn collect_reminders(mut statement: Statement<'_>) -> Result<Vec<Reminder>> {
    let mut reminders = Vec::new();
    while statement.next()? == State::Row {
        reminders.push(read_reminder(&statement)?);
    }
    Ok(reminders)
}

impl Database {
    pub async fn add_reminder(
        &self,
        channel_id: i64,
        message: &str,
        remind_at: DateTime<Utc>,
        repeat_interval: i64,
        repeat_max: i64,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let id = {
            let connection = self.lock()?;
            let mut statement = connection.prepare(
                "INSERT INTO reminders (channel_id, message, remind_at, repeat_interval, repeat_max, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, channel_id))?;
            statement.bind((2, message))?;
            statement.bind((3, remind_at.timestamp()))?;
            statement.bind((4, repeat_interval))?;
            statement.bind((5, repeat_max))?;
            statement.bind((6, now.timestamp()))?;
            statement.next()?;
            last_insert_id(&connection)?
        };

        info!("Created reminder {id} in channel {channel_id} for {remind_at}");
        self.get_reminder(id)
            .await?
            .ok_or_else(|| anyhow!("reminder {id} vanished after insert"))
    }

    pub async fn get_reminder(&self, id: i64) -> Result<Option<Reminder>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r WHERE r.id = ?"
        ))?;
        statement.bind((1, id))?;
        if statement.next()? == State::Row {
            Ok(Some(read_reminder(&statement)?))
        } else {
            Ok(None)
        }
    }

    /// Look up a reminder only if it belongs to the given channel
    pub async fn get_reminder_for_channel(
        &self,
        channel_id: i64,
        id: i64,
    ) -> Result<Option<Reminder>> {
        Ok(self
            .get_reminder(id)
            .await?
            .filter(|r| r.channel_id == channel_id))
    }

    /// Active reminders whose time has come, across all live channels
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r
             JOIN channels c ON c.id = r.channel_id
             WHERE r.active = 1 AND r.remind_at <= ? AND c.deleted = 0
             ORDER BY r.remind_at"
        ))?;
        statement.bind((1, now.timestamp()))?;
        collect_reminders(statement)
    }

    /// Active reminders of a channel, soonest first
    pub async fn pending_reminders(&self, channel_id: i64) -> Result<Vec<Reminder>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r
             WHERE r.channel_id = ? AND r.active = 1
             ORDER BY r.remind_at"
        ))?;
        statement.bind((1, channel_id))?;
        collect_reminders(statement)
    }

    /// Active reminders of a channel falling into the next 24 hours
    pub async fn due_within_24h(
        &self,
        channel_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r
             WHERE r.channel_id = ? AND r.active = 1 AND r.remind_at >= ? AND r.remind_at <= ?
             ORDER BY r.remind_at"
        ))?;
        statement.bind((1, channel_id))?;
        statement.bind((2, now.timestamp()))?;
        statement.bind((3, (now + Duration::hours(24)).timestamp()))?;
        collect_reminders(statement)
    }

    /// Move a reminder to a new time and make it active again
    pub async fn reschedule_reminder(&self, id: i64, remind_at: DateTime<Utc>) -> Result<Reminder> {
        {
            let connection = self.lock()?;
            let mut statement =
                connection.prepare("UPDATE reminders SET remind_at = ?, active = 1 WHERE id = ?")?;
            statement.bind((1, remind_at.timestamp()))?;
            statement.bind((2, id))?;
            statement.next()?;
        }
        self.get_reminder(id)
            .await?
            .ok_or_else(|| anyhow!("reminder {id} not found"))
    }

    /// Turn a reminder into a repeating one and make it active again.
    ///
    /// A reminder whose time already passed (a fired one-off reminder) moves to the next
    /// occurrence after `now`; the repeat count starts over from there.
    pub async fn set_reminder_repeat(
        &self,
        id: i64,
        repeat_interval: i64,
        repeat_max: i64,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let reminder = self
            .get_reminder(id)
            .await?
            .ok_or_else(|| anyhow!("reminder {id} not found"))?;
        let interval = Duration::try_minutes(repeat_interval)
            .ok_or_else(|| anyhow!("repeat interval of {repeat_interval} minutes is out of range"))?;
        let remind_at = reminder
            .next_occurrence_after(interval, now)
            .ok_or_else(|| anyhow!("reminder {id} has no occurrence after {now}"))?;

        {
            let connection = self.lock()?;
            let mut statement = connection.prepare(
                "UPDATE reminders SET remind_at = ?, active = 1, repeat_interval = ?, repeat_max = ?, repeated = 0
                 WHERE id = ?",
            )?;
            statement.bind((1, remind_at.timestamp()))?;
            statement.bind((2, repeat_interval))?;
            statement.bind((3, repeat_max))?;
            statement.bind((4, id))?;
            statement.next()?;
        }
        info!("Reminder {id} now repeats every {repeat_interval} minutes, next at {remind_at}");
        self.get_reminder(id)
            .await?
            .ok_or_else(|| anyhow!("reminder {id} not found"))
    }

    pub async fn set_reminder_inactive(&self, id: i64) -> Result<()> {
        let connection = self.lock()?;
        let mut statement = connection.prepare("UPDATE reminders SET active = 0 WHERE id = ?")?;
        statement.bind((1, id))?;
        statement.next()?;
        Ok(())
    }

    /// Commit the "fired" transition of a reminder.
    ///
    /// The update only applies if the row still holds the state that was fired, so two
    /// overlapping passes cannot both advance it. Returns the new state, or `None` when
    /// the row changed underneath.
    pub async fn commit_fired_reminder(
        &self,
        fired: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<Option<Reminder>> {
        let next = fired.after_fire(now);
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "UPDATE reminders SET remind_at = ?, active = ?, repeated = ?
             WHERE id = ? AND active = 1 AND remind_at = ? AND repeated = ?",
        )?;
        statement.bind((1, next.remind_at.timestamp()))?;
        statement.bind((2, i64::from(next.active)))?;
        statement.bind((3, next.repeated))?;
        statement.bind((4, fired.id))?;
        statement.bind((5, fired.remind_at.timestamp()))?;
        statement.bind((6, fired.repeated))?;
        statement.next()?;

        if connection.change_count() == 0 {
            debug!("Reminder {} changed while firing, commit skipped", fired.id);
            return Ok(None);
        }
        Ok(Some(next))
    }

    /// Hard-delete a reminder; its messages go with it
    pub async fn delete_reminder(&self, id: i64) -> Result<()> {
        let connection = self.lock()?;
        let mut statement = connection.prepare("DELETE FROM reminders WHERE id = ?")?;
        statement.bind((1, id))?;
        statement.next()?;
        info!("Deleted reminder {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Role;
    use chrono::TimeZone;

    async fn setup() -> (Database, i64, DateTime<Utc>) {
        let db = Database::new(":memory:").await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let channel = db.add_channel("dm-1", "user-1", Role::User, now).await.unwrap();
        (db, channel.id, now)
    }

    #[tokio::test]
    async fn test_due_reminders_only_returns_due_and_active() {
        let (db, channel_id, now) = setup().await;
        let due = db
            .add_reminder(channel_id, "due", now - Duration::minutes(1), 0, 0, now)
            .await
            .unwrap();
        db.add_reminder(channel_id, "later", now + Duration::hours(2), 0, 0, now)
            .await
            .unwrap();
        let inactive = db
            .add_reminder(channel_id, "done", now - Duration::hours(1), 0, 0, now)
            .await
            .unwrap();
        db.set_reminder_inactive(inactive.id).await.unwrap();

        let found = db.due_reminders(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_fired_commit_is_single_shot() {
        let (db, channel_id, now) = setup().await;
        let reminder = db
            .add_reminder(channel_id, "water", now, 60, 2, now)
            .await
            .unwrap();

        let first = db.commit_fired_reminder(&reminder, now).await.unwrap().unwrap();
        assert!(first.active);
        assert_eq!(first.repeated, 1);
        assert_eq!(first.remind_at, now + Duration::minutes(60));

        // A second commit of the same (stale) state must not advance again
        assert!(db.commit_fired_reminder(&reminder, now).await.unwrap().is_none());

        let stored = db.get_reminder(reminder.id).await.unwrap().unwrap();
        let second = db
            .commit_fired_reminder(&stored, stored.remind_at)
            .await
            .unwrap()
            .unwrap();
        assert!(!second.active);
        assert_eq!(second.repeated, 2);
        assert!(db.due_reminders(now + Duration::days(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_within_24h_window() {
        let (db, channel_id, now) = setup().await;
        db.add_reminder(channel_id, "soon", now + Duration::hours(3), 0, 0, now)
            .await
            .unwrap();
        db.add_reminder(channel_id, "next week", now + Duration::days(7), 0, 0, now)
            .await
            .unwrap();

        let found = db.due_within_24h(channel_id, now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "soon");
    }

    #[tokio::test]
    async fn test_reschedule_reactivates() {
        let (db, channel_id, now) = setup().await;
        let reminder = db
            .add_reminder(channel_id, "call", now, 0, 0, now)
            .await
            .unwrap();
        db.set_reminder_inactive(reminder.id).await.unwrap();

        let moved = db
            .reschedule_reminder(reminder.id, now + Duration::days(1))
            .await
            .unwrap();
        assert!(moved.active);
        assert_eq!(moved.remind_at, now + Duration::days(1));
    }

    #[tokio::test]
    async fn test_repeat_reactivates_fired_reminder() {
        let (db, channel_id, now) = setup().await;
        let reminder = db
            .add_reminder(channel_id, "stretch", now - Duration::hours(2), 0, 0, now)
            .await
            .unwrap();
        db.commit_fired_reminder(&reminder, now).await.unwrap().unwrap();

        let repeating = db
            .set_reminder_repeat(reminder.id, 1440, 1825, now)
            .await
            .unwrap();
        assert!(repeating.active);
        assert_eq!(repeating.repeated, 0);
        assert_eq!(repeating.remind_at, now + Duration::hours(22));
        assert_eq!(db.due_reminders(now + Duration::days(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_keeps_future_time() {
        let (db, channel_id, now) = setup().await;
        let reminder = db
            .add_reminder(channel_id, "stretch", now + Duration::hours(3), 0, 0, now)
            .await
            .unwrap();

        let repeating = db.set_reminder_repeat(reminder.id, 60, 10, now).await.unwrap();
        assert_eq!(repeating.remind_at, now + Duration::hours(3));
        assert_eq!((repeating.repeat_interval, repeating.repeat_max), (60, 10));
    }

    #[tokio::test]
    async fn test_reminder_scoped_to_channel() {
        let (db, channel_id, now) = setup().await;
        let reminder = db
            .add_reminder(channel_id, "call", now, 0, 0, now)
            .await
            .unwrap();
        assert!(db
            .get_reminder_for_channel(channel_id, reminder.id)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .get_reminder_for_channel(channel_id + 1, reminder.id)
            .await
            .unwrap()
            .is_none());
    }
}
