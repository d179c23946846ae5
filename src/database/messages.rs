use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlite::{State, Statement};

use super::{from_timestamp, last_insert_id, Database, Message, MessageType, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, external_id, channel_id, reminder_id, body, body_html, message_type, timestamp";

fn read_message(statement: &Statement<'_>) -> Result<Message> {
    Ok(Message {
        id: statement.read::<i64, _>("id")?,
        external_id: statement.read::<String, _>("external_id")?,
        channel_id: statement.read::<i64, _>("channel_id")?,
        reminder_id: statement.read::<Option<i64>, _>("reminder_id")?,
        body: statement.read::<String, _>("body")?,
        body_html: statement.read::<String, _>("body_html")?,
        message_type: statement.read::<String, _>("message_type")?.parse()?,
        timestamp: from_timestamp(statement.read::<i64, _>("timestamp")?)?,
    })
}

fn first_message(mut statement: Statement<'_>) -> Result<Option<Message>> {
    if statement.next()? == State::Row {
        Ok(Some(read_message(&statement)?))
    } else {
        Ok(None)
    }
}

impl Database {
    pub async fn add_message(&self, message: NewMessage) -> Result<Message> {
        if message.message_type == MessageType::DoNotSave {
            return Err(anyhow!("messages of type {} are not recorded", message.message_type));
        }

        let id = {
            let connection = self.lock()?;
            let mut statement = connection.prepare(
                "INSERT INTO messages (external_id, channel_id, reminder_id, body, body_html, message_type, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, message.external_id.as_str()))?;
            statement.bind((2, message.channel_id))?;
            statement.bind((3, message.reminder_id))?;
            statement.bind((4, message.body.as_str()))?;
            statement.bind((5, message.body_html.as_str()))?;
            statement.bind((6, message.message_type.as_str()))?;
            statement.bind((7, message.timestamp.timestamp()))?;
            statement.next()?;
            last_insert_id(&connection)?
        };

        Ok(Message {
            id,
            external_id: message.external_id,
            channel_id: message.channel_id,
            reminder_id: message.reminder_id,
            body: message.body,
            body_html: message.body_html,
            message_type: message.message_type,
            timestamp: DateTime::<Utc>::from_timestamp(message.timestamp.timestamp(), 0)
                .unwrap_or(message.timestamp),
        })
    }

    /// Resolve a transport event id to the message recorded for it
    pub async fn message_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_id = ? ORDER BY id DESC LIMIT 1"
        ))?;
        statement.bind((1, external_id))?;
        first_message(statement)
    }

    /// Most recent message of a type in a channel
    pub async fn last_message_of_type(
        &self,
        message_type: MessageType,
        channel_id: i64,
    ) -> Result<Option<Message>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE channel_id = ? AND message_type = ?
             ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))?;
        statement.bind((1, channel_id))?;
        statement.bind((2, message_type.as_str()))?;
        first_message(statement)
    }

    /// Most recent message of a type attached to a reminder
    pub async fn message_for_reminder(
        &self,
        reminder_id: i64,
        message_type: MessageType,
    ) -> Result<Option<Message>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE reminder_id = ? AND message_type = ?
             ORDER BY id DESC LIMIT 1"
        ))?;
        statement.bind((1, reminder_id))?;
        statement.bind((2, message_type.as_str()))?;
        first_message(statement)
    }

    pub async fn messages_by_reminder(&self, reminder_id: i64) -> Result<Vec<Message>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE reminder_id = ? ORDER BY id"
        ))?;
        statement.bind((1, reminder_id))?;

        let mut messages = Vec::new();
        while statement.next()? == State::Row {
            messages.push(read_message(&statement)?);
        }
        Ok(messages)
    }
}
