//! # SQLite Store
//!
//! Persistence for channels, reminders and recorded messages. Every method locks the
//! single connection for the duration of one short synchronous query block; row-level
//! updates are read-compute-write unless noted otherwise.
//!
//! - **Version**: 1.3.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.3.0: Third party resources and imported reminders
//! - 1.2.0: Conditional commit for fired reminders
//! - 1.1.0: Soft-deleted channels and calendar secrets
//! - 1.0.0: Initial schema for channels, reminders and messages

mod channels;
mod messages;
pub mod models;
mod reminders;
mod resources;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::info;
use sqlite::{Connection, State};
use std::sync::{Arc, Mutex, MutexGuard};

pub use models::{
    Channel, Message, MessageType, NewMessage, Reminder, ResourceKind, Role, ThirdPartyResource,
};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_identifier TEXT NOT NULL,
        user_identifier TEXT NOT NULL,
        timezone TEXT,
        daily_reminder INTEGER,
        calendar_secret TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        created_at INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_channels_user
        ON channels(user_identifier, channel_identifier);

    CREATE TABLE IF NOT EXISTS reminders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
        message TEXT NOT NULL,
        remind_at INTEGER NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        repeat_interval INTEGER NOT NULL DEFAULT 0,
        repeat_max INTEGER NOT NULL DEFAULT 0,
        repeated INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        resource_id INTEGER REFERENCES third_party_resources(id) ON DELETE SET NULL,
        resource_uid TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(active, remind_at);

    CREATE TABLE IF NOT EXISTS third_party_resources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
        resource_type TEXT NOT NULL,
        resource_url TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_resources_type ON third_party_resources(resource_type);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL,
        channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
        reminder_id INTEGER REFERENCES reminders(id) ON DELETE CASCADE,
        body TEXT NOT NULL,
        body_html TEXT NOT NULL,
        message_type TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_external ON messages(external_id);
    CREATE INDEX IF NOT EXISTS idx_messages_channel_type
        ON messages(channel_id, message_type, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_reminder ON messages(reminder_id);
";

/// Shared handle to the reminder database
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`; `:memory:` gives a private in-memory store
    pub async fn new(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute(SCHEMA)?;
        migrate_imported_reminders(&connection)?;
        info!("Database ready at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }
}

/// Databases created before imports existed lack the resource columns on reminders
fn migrate_imported_reminders(connection: &Connection) -> Result<()> {
    let mut has_resource = false;
    {
        let mut statement = connection.prepare("PRAGMA table_info(reminders)")?;
        while statement.next()? == State::Row {
            if statement.read::<String, _>("name")? == "resource_id" {
                has_resource = true;
            }
        }
    }

    if !has_resource {
        info!("Adding resource columns to reminders");
        connection.execute(
            "ALTER TABLE reminders ADD COLUMN resource_id INTEGER
                 REFERENCES third_party_resources(id) ON DELETE SET NULL;
             ALTER TABLE reminders ADD COLUMN resource_uid TEXT;",
        )?;
    }
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_reminders_resource
             ON reminders(channel_id, resource_id, resource_uid);",
    )?;
    Ok(())
}

fn last_insert_id(connection: &Connection) -> Result<i64> {
    let mut statement = connection.prepare("SELECT last_insert_rowid()")?;
    statement.next()?;
    Ok(statement.read::<i64, _>(0)?)
}

fn from_timestamp(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| anyhow!("invalid timestamp {seconds}"))
}
