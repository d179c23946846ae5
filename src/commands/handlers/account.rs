//! Account management
//!
//! Handles: delete all my data, add user (admin only)
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Data deletion and admin onboarding of users

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use regex::Regex;
use std::sync::OnceLock;

use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::Action;
use crate::database::{Channel, MessageType, Role};
use crate::delivery::Record;

pub struct DeleteDataAction;

#[async_trait]
impl Action for DeleteDataAction {
    fn name(&self) -> &'static str {
        "Delete all your data"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["delete all my data from remindme", "remove my data at remindme"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)((^delete|^remove)(| all|)( my| every| the) data( from| at) remindme$)"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        let removed = ctx
            .database
            .delete_channels_from_user(&channel.user_identifier)
            .await?;
        info!(
            "Removed {removed} channels and their data for user {}",
            channel.user_identifier
        );

        ctx.reply(
            channel,
            &event.event_id,
            "Removed all your channels and data. If you have channels open I invited you into please ask the administrator to remove you from the configuration file.",
            MessageType::DoNotSave,
        );
        Ok(())
    }
}

/// Pull a user id out of `add user <@123>`, `add user <@!123>` or `add user 123`
fn user_from_text(text: &str) -> Option<String> {
    static MENTION: OnceLock<Option<Regex>> = OnceLock::new();
    let mention = MENTION.get_or_init(|| Regex::new(r"<@!?(\d+)>").ok());

    if let Some(caps) = mention.as_ref().and_then(|re| re.captures(text)) {
        return Some(caps[1].to_string());
    }

    let rest = text.get("add user".len()..)?.trim();
    (!rest.is_empty() && !rest.contains(char::is_whitespace)).then(|| rest.to_string())
}

pub struct AddUserAction;

#[async_trait]
impl Action for AddUserAction {
    fn name(&self) -> &'static str {
        "Add a user"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["add user @someone"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(^add user).*"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        if !channel.is_admin() {
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry, only administrators can add users.",
                MessageType::DoNotSave,
            );
            return Ok(());
        }

        let Some(user) = user_from_text(&event.text()) else {
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry :(, I was not able to get a user out of your message",
                MessageType::DoNotSave,
            );
            return Ok(());
        };

        if !ctx.database.get_channels_by_user(&user).await?.is_empty() {
            ctx.reply(channel, &event.event_id, "User is already added", MessageType::DoNotSave);
            return Ok(());
        }

        let direct = match ctx.messenger.open_direct_channel(&user).await {
            Ok(direct) => direct,
            Err(e) => {
                warn!("Could not open a direct channel with {user}: {e}");
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Sorry, something went wrong here",
                    MessageType::DoNotSave,
                );
                return Ok(());
            }
        };

        let added = ctx
            .database
            .add_channel(&direct, &user, Role::User, ctx.now())
            .await?;
        info!("Admin {} added user {user} (channel {})", channel.user_identifier, added.id);

        ctx.notify(
            &added,
            "Hey, you can now create reminders with me. Message me \"commands\" to see what I understand.",
            Record::new(&added, MessageType::DoNotSave),
        );
        ctx.reply(
            channel,
            &event.event_id,
            &format!("Added {} to the channel", ctx.messenger.mention(&user)),
            MessageType::AddUser,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::TestBed;
    use crate::delivery::testing::wait_for_messages;

    #[test]
    fn test_user_from_text() {
        assert_eq!(user_from_text("add user <@!42>"), Some("42".to_string()));
        assert_eq!(user_from_text("add user <@42>"), Some("42".to_string()));
        assert_eq!(user_from_text("add user 42"), Some("42".to_string()));
        assert_eq!(user_from_text("add user"), None);
        assert_eq!(user_from_text("add user two words"), None);
    }

    #[tokio::test]
    async fn test_admin_adds_user() {
        let bed = TestBed::with_role(Role::Admin).await;
        let event = bed.message("$add", "add user <@77>");

        AddUserAction.handle(&bed.ctx, &event, &bed.channel).await.unwrap();
        wait_for_messages(&bed.transport, 2).await;

        let channels = bed.ctx.database.get_channels_by_user("77").await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_identifier, "dm-77");
        assert_eq!(channels[0].role, Role::User);

        let bodies: Vec<_> = bed.transport.messages().into_iter().map(|(_, m)| m.body).collect();
        assert!(bodies.contains(&"Added @77 to the channel".to_string()));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_add_users() {
        let bed = TestBed::new().await;
        let event = bed.message("$add", "add user <@77>");

        AddUserAction.handle(&bed.ctx, &event, &bed.channel).await.unwrap();
        wait_for_messages(&bed.transport, 1).await;

        assert!(bed.ctx.database.get_channels_by_user("77").await.unwrap().is_empty());
        assert_eq!(
            bed.transport.messages()[0].1.body,
            "Sorry, only administrators can add users."
        );
    }

    #[tokio::test]
    async fn test_delete_data_removes_channel() {
        let bed = TestBed::new().await;
        let event = bed.message("$del", "delete all my data from remindme");

        DeleteDataAction.handle(&bed.ctx, &event, &bed.channel).await.unwrap();
        wait_for_messages(&bed.transport, 1).await;

        assert!(bed.ctx.database.get_channel(bed.channel.id).await.unwrap().is_none());
        assert!(bed.transport.messages()[0].1.body.starts_with("Removed all your channels and data."));
    }
}
