use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::info;
use rand::distr::Alphanumeric;
use rand::Rng;
use sqlite::{State, Statement};

use super::{from_timestamp, last_insert_id, Channel, Database, Role};

const CALENDAR_SECRET_LENGTH: usize = 30;

const CHANNEL_COLUMNS: &str = "id, channel_identifier, user_identifier, timezone, daily_reminder, \
     calendar_secret, role, created_at";

fn new_calendar_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CALENDAR_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

fn read_channel(statement: &Statement<'_>) -> Result<Channel> {
    Ok(Channel {
        id: statement.read::<i64, _>("id")?,
        channel_identifier: statement.read::<String, _>("channel_identifier")?,
        user_identifier: statement.read::<String, _>("user_identifier")?,
        timezone: statement.read::<Option<String>, _>("timezone")?,
        daily_reminder: statement
            .read::<Option<i64>, _>("daily_reminder")?
            .map(|m| m as u32),
        calendar_secret: statement.read::<String, _>("calendar_secret")?,
        role: statement.read::<String, _>("role")?.parse()?,
        created_at: from_timestamp(statement.read::<i64, _>("created_at")?)?,
    })
}

fn collect_channels(mut statement: Statement<'_>) -> Result<Vec<Channel>> {
    let mut channels = Vec::new();
    while statement.next()? == State::Row {
        channels.push(read_channel(&statement)?);
    }
    Ok(channels)
}

impl Database {
    /// Create a channel with a fresh calendar secret
    pub async fn add_channel(
        &self,
        channel_identifier: &str,
        user_identifier: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Channel> {
        let id = {
            let connection = self.lock()?;
            let mut statement = connection.prepare(
                "INSERT INTO channels (channel_identifier, user_identifier, calendar_secret, role, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, channel_identifier))?;
            statement.bind((2, user_identifier))?;
            statement.bind((3, new_calendar_secret().as_str()))?;
            statement.bind((4, role.as_str()))?;
            statement.bind((5, now.timestamp()))?;
            statement.next()?;
            last_insert_id(&connection)?
        };

        info!("Added channel {id} for user {user_identifier} ({role})");
        self.get_channel(id)
            .await?
            .ok_or_else(|| anyhow!("channel {id} vanished after insert"))
    }

    pub async fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ? AND deleted = 0"
        ))?;
        statement.bind((1, id))?;
        if statement.next()? == State::Row {
            Ok(Some(read_channel(&statement)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_channel_by_user_and_identifier(
        &self,
        user_identifier: &str,
        channel_identifier: &str,
    ) -> Result<Option<Channel>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE user_identifier = ? AND channel_identifier = ? AND deleted = 0
             ORDER BY id LIMIT 1"
        ))?;
        statement.bind((1, user_identifier))?;
        statement.bind((2, channel_identifier))?;
        if statement.next()? == State::Row {
            Ok(Some(read_channel(&statement)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_channels_by_user(&self, user_identifier: &str) -> Result<Vec<Channel>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE user_identifier = ? AND deleted = 0 ORDER BY id"
        ))?;
        statement.bind((1, user_identifier))?;
        collect_channels(statement)
    }

    /// Channels with a daily digest time configured
    pub async fn channels_with_daily_reminder(&self) -> Result<Vec<Channel>> {
        let connection = self.lock()?;
        let statement = connection.prepare(format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE daily_reminder IS NOT NULL AND deleted = 0 ORDER BY id"
        ))?;
        collect_channels(statement)
    }

    pub async fn set_channel_timezone(&self, id: i64, timezone: &str) -> Result<Channel> {
        {
            let connection = self.lock()?;
            let mut statement =
                connection.prepare("UPDATE channels SET timezone = ? WHERE id = ?")?;
            statement.bind((1, timezone))?;
            statement.bind((2, id))?;
            statement.next()?;
        }
        self.get_channel(id)
            .await?
            .ok_or_else(|| anyhow!("channel {id} not found"))
    }

    /// Set (or with `None` disable) the daily digest time in minutes since local midnight
    pub async fn set_daily_reminder(&self, id: i64, minutes: Option<u32>) -> Result<Channel> {
        {
            let connection = self.lock()?;
            let mut statement =
                connection.prepare("UPDATE channels SET daily_reminder = ? WHERE id = ?")?;
            statement.bind((1, minutes.map(i64::from)))?;
            statement.bind((2, id))?;
            statement.next()?;
        }
        self.get_channel(id)
            .await?
            .ok_or_else(|| anyhow!("channel {id} not found"))
    }

    /// Replace the calendar secret; links using the old one stop working
    pub async fn renew_calendar_secret(&self, id: i64) -> Result<String> {
        let secret = new_calendar_secret();
        let connection = self.lock()?;
        let mut statement =
            connection.prepare("UPDATE channels SET calendar_secret = ? WHERE id = ? AND deleted = 0")?;
        statement.bind((1, secret.as_str()))?;
        statement.bind((2, id))?;
        statement.next()?;
        if connection.change_count() == 0 {
            return Err(anyhow!("channel {id} not found"));
        }
        Ok(secret)
    }

    /// Soft-delete every channel of a user and drop their reminders and messages.
    /// Returns the number of channels removed.
    pub async fn delete_channels_from_user(&self, user_identifier: &str) -> Result<usize> {
        let connection = self.lock()?;
        connection.execute("BEGIN")?;

        let result = (|| -> Result<usize> {
            for sql in [
                "DELETE FROM messages WHERE channel_id IN
                    (SELECT id FROM channels WHERE user_identifier = ?)",
                "DELETE FROM reminders WHERE channel_id IN
                    (SELECT id FROM channels WHERE user_identifier = ?)",
                "DELETE FROM third_party_resources WHERE channel_id IN
                    (SELECT id FROM channels WHERE user_identifier = ?)",
            ] {
                let mut statement = connection.prepare(sql)?;
                statement.bind((1, user_identifier))?;
                statement.next()?;
            }

            let mut statement = connection.prepare(
                "UPDATE channels SET deleted = 1, daily_reminder = NULL
                 WHERE user_identifier = ? AND deleted = 0",
            )?;
            statement.bind((1, user_identifier))?;
            statement.next()?;
            Ok(connection.change_count())
        })();

        match result {
            Ok(count) => {
                connection.execute("COMMIT")?;
                info!("Deleted {count} channel(s) of user {user_identifier}");
                Ok(count)
            }
            Err(e) => {
                connection.execute("ROLLBACK")?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_add_and_find_channel() {
        let db = db().await;
        let now = Utc::now();
        let channel = db.add_channel("dm-1", "user-1", Role::Admin, now).await.unwrap();

        assert_eq!(channel.role, Role::Admin);
        assert_eq!(channel.calendar_secret.len(), CALENDAR_SECRET_LENGTH);
        assert!(channel.timezone.is_none());
        assert!(channel.daily_reminder.is_none());

        let found = db
            .get_channel_by_user_and_identifier("user-1", "dm-1")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(channel.id));
        assert!(db
            .get_channel_by_user_and_identifier("user-1", "dm-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_settings_updates() {
        let db = db().await;
        let channel = db.add_channel("dm-1", "user-1", Role::User, Utc::now()).await.unwrap();

        let updated = db.set_channel_timezone(channel.id, "Europe/Berlin").await.unwrap();
        assert_eq!(updated.timezone.as_deref(), Some("Europe/Berlin"));

        let updated = db.set_daily_reminder(channel.id, Some(540)).await.unwrap();
        assert_eq!(updated.daily_reminder, Some(540));
        assert_eq!(db.channels_with_daily_reminder().await.unwrap().len(), 1);

        let updated = db.set_daily_reminder(channel.id, None).await.unwrap();
        assert_eq!(updated.daily_reminder, None);
        assert!(db.channels_with_daily_reminder().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renew_calendar_secret() {
        let db = db().await;
        let channel = db.add_channel("dm-1", "user-1", Role::User, Utc::now()).await.unwrap();
        let secret = db.renew_calendar_secret(channel.id).await.unwrap();

        assert_ne!(secret, channel.calendar_secret);
        let reloaded = db.get_channel(channel.id).await.unwrap().unwrap();
        assert_eq!(reloaded.calendar_secret, secret);
        assert!(db.renew_calendar_secret(9999).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_channels_from_user() {
        let db = db().await;
        let now = Utc::now();
        let channel = db.add_channel("dm-1", "user-1", Role::User, now).await.unwrap();
        let other = db.add_channel("dm-2", "user-2", Role::User, now).await.unwrap();
        db.add_reminder(channel.id, "a", now + Duration::hours(1), 0, 0, now)
            .await
            .unwrap();
        db.add_reminder(other.id, "b", now + Duration::hours(1), 0, 0, now)
            .await
            .unwrap();

        assert_eq!(db.delete_channels_from_user("user-1").await.unwrap(), 1);
        assert!(db.get_channel(channel.id).await.unwrap().is_none());
        assert!(db.get_channels_by_user("user-1").await.unwrap().is_empty());
        assert!(db.pending_reminders(channel.id).await.unwrap().is_empty());
        assert_eq!(db.pending_reminders(other.id).await.unwrap().len(), 1);
    }
}
