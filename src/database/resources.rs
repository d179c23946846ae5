use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlite::{State, Statement};

use super::{from_timestamp, last_insert_id, Database, Reminder, ResourceKind, ThirdPartyResource};

const RESOURCE_COLUMNS: &str = "t.id, t.channel_id, t.resource_type, t.resource_url, t.created_at";

fn read_resource(statement: &Statement<'_>) -> Result<ThirdPartyResource> {
    Ok(ThirdPartyResource {
        id: statement.read::<i64, _>("id")?,
        channel_id: statement.read::<i64, _>("channel_id")?,
        kind: statement.read::<String, _>("resource_type")?.parse()?,
        url: statement.read::<String, _>("resource_url")?,
        created_at: from_timestamp(statement.read::<i64, _>("created_at")?)?,
    })
}

impl Database {
    pub async fn add_third_party_resource(
        &self,
        channel_id: i64,
        kind: ResourceKind,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<ThirdPartyResource> {
        let id = {
            let connection = self.lock()?;
            let mut statement = connection.prepare(
                "INSERT INTO third_party_resources (channel_id, resource_type, resource_url, created_at)
                 VALUES (?, ?, ?, ?)",
            )?;
            statement.bind((1, channel_id))?;
            statement.bind((2, kind.as_str()))?;
            statement.bind((3, url))?;
            statement.bind((4, now.timestamp()))?;
            statement.next()?;
            last_insert_id(&connection)?
        };

        info!("Channel {channel_id} subscribed to {} resource {id}", kind.as_str());
        self.get_third_party_resource(id)
            .await?
            .ok_or_else(|| anyhow!("resource {id} vanished after insert"))
    }

    pub async fn get_third_party_resource(&self, id: i64) -> Result<Option<ThirdPartyResource>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {RESOURCE_COLUMNS} FROM third_party_resources t WHERE t.id = ?"
        ))?;
        statement.bind((1, id))?;
        if statement.next()? == State::Row {
            Ok(Some(read_resource(&statement)?))
        } else {
            Ok(None)
        }
    }

    /// The channel's subscription to `url`, if it already has one
    pub async fn find_third_party_resource(
        &self,
        channel_id: i64,
        kind: ResourceKind,
        url: &str,
    ) -> Result<Option<ThirdPartyResource>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {RESOURCE_COLUMNS} FROM third_party_resources t
             WHERE t.channel_id = ? AND t.resource_type = ? AND t.resource_url = ?"
        ))?;
        statement.bind((1, channel_id))?;
        statement.bind((2, kind.as_str()))?;
        statement.bind((3, url))?;
        if statement.next()? == State::Row {
            Ok(Some(read_resource(&statement)?))
        } else {
            Ok(None)
        }
    }

    /// Every resource of `kind` that belongs to a live channel
    pub async fn third_party_resources(&self, kind: ResourceKind) -> Result<Vec<ThirdPartyResource>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {RESOURCE_COLUMNS} FROM third_party_resources t
             JOIN channels c ON c.id = t.channel_id
             WHERE t.resource_type = ? AND c.deleted = 0
             ORDER BY t.id"
        ))?;
        statement.bind((1, kind.as_str()))?;

        let mut resources = Vec::new();
        while statement.next()? == State::Row {
            resources.push(read_resource(&statement)?);
        }
        Ok(resources)
    }

    /// Insert the reminder for an imported event, or move the one imported earlier.
    ///
    /// Events are keyed by channel, resource and the event's uid. Updating an event
    /// reactivates its reminder.
    pub async fn upsert_imported_reminder(
        &self,
        resource: &ThirdPartyResource,
        uid: &str,
        message: &str,
        remind_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let id = {
            let connection = self.lock()?;
            let existing = {
                let mut statement = connection.prepare(
                    "SELECT id FROM reminders
                     WHERE channel_id = ? AND resource_id = ? AND resource_uid = ?",
                )?;
                statement.bind((1, resource.channel_id))?;
                statement.bind((2, resource.id))?;
                statement.bind((3, uid))?;
                if statement.next()? == State::Row {
                    Some(statement.read::<i64, _>(0)?)
                } else {
                    None
                }
            };

            match existing {
                Some(id) => {
                    let mut statement = connection.prepare(
                        "UPDATE reminders SET message = ?, remind_at = ?, active = 1 WHERE id = ?",
                    )?;
                    statement.bind((1, message))?;
                    statement.bind((2, remind_at.timestamp()))?;
                    statement.bind((3, id))?;
                    statement.next()?;
                    debug!("Updated imported reminder {id} for event {uid}");
                    id
                }
                None => {
                    let mut statement = connection.prepare(
                        "INSERT INTO reminders (channel_id, message, remind_at, created_at, resource_id, resource_uid)
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )?;
                    statement.bind((1, resource.channel_id))?;
                    statement.bind((2, message))?;
                    statement.bind((3, remind_at.timestamp()))?;
                    statement.bind((4, now.timestamp()))?;
                    statement.bind((5, resource.id))?;
                    statement.bind((6, uid))?;
                    statement.next()?;
                    let id = last_insert_id(&connection)?;
                    info!(
                        "Imported event {uid} from resource {} as reminder {id}",
                        resource.id
                    );
                    id
                }
            }
        };

        self.get_reminder(id)
            .await?
            .ok_or_else(|| anyhow!("reminder {id} vanished after import"))
    }
}
