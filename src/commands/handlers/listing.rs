//! Listing commands
//!
//! Handles: list reminders, list commands
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Open reminders and command overview

use anyhow::Result;
use async_trait::async_trait;

use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::Action;
use crate::commands::registry::ActionRegistry;
use crate::core::{to_local_time, Formatter};
use crate::database::{Channel, MessageType, Reminder};
use crate::delivery::Record;

/// Examples shown for reminders created from free text
const NEW_REMINDER_EXAMPLES: [&str; 2] = ["Laundry at Sunday 12am", "Go shopping in 4 hours"];

pub fn render_reminder_list(reminders: &[Reminder], timezone: Option<&str>) -> (String, String) {
    let mut formatter = Formatter::new();
    formatter
        .title("Open Reminders")
        .text_line("You asked for your open reminders, here they are:")
        .new_line();

    for reminder in reminders {
        let line = format!(
            "ID {} at {} {}",
            reminder.id,
            to_local_time(reminder.remind_at, timezone),
            reminder.icons().join(" ")
        );
        formatter
            .bold_line(&reminder.message)
            .italic_line(line.trim_end())
            .new_line();
    }
    formatter.build()
}

pub fn render_command_list(registry: &ActionRegistry) -> (String, String) {
    let mut formatter = Formatter::new();
    formatter
        .title("Available Commands")
        .text_line("You can interact with me in many ways, check out my features:")
        .new_line();

    for action in registry.actions() {
        formatter.bold_line(action.name());
        if !action.examples().is_empty() {
            formatter
                .text_line("Here are some examples how you can tell me to perform this action:")
                .list(action.examples());
        }
        formatter.new_line();
    }

    formatter
        .bold_line("Make a new Reminder")
        .text_line("To make a new reminder I will process all messages that are not part of one of the above commands. Try it with:")
        .list(&NEW_REMINDER_EXAMPLES)
        .new_line();

    if registry.reply_actions().next().is_some() {
        formatter
            .sub_title("Replies")
            .text_line("Reply to one of your reminders with:")
            .new_line();
        for action in registry.reply_actions() {
            formatter.bold_line(action.name()).list(action.examples()).new_line();
        }
    }

    if registry.reaction_actions().next().is_some() {
        formatter
            .sub_title("Reactions")
            .text_line("I am able to understand a few reactions you can give to a message.")
            .new_line();
        for (scope, action) in registry.reaction_actions() {
            formatter
                .bold_line(action.name())
                .text(&format!(
                    "Available for {}. Give the message one of these reactions: {}",
                    scope.label(),
                    action.keys().join(" ")
                ))
                .new_line();
        }
    }
    formatter.build()
}

pub struct ListRemindersAction;

#[async_trait]
impl Action for ListRemindersAction {
    fn name(&self) -> &'static str {
        "List all reminders"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["list", "list reminders", "show", "show reminders", "list my reminders", "reminders"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^((list|show)(| all| the)(| reminders| my reminders)(| please)|^reminders|^reminder)[ ]*$"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        let reminders = ctx.database.pending_reminders(channel.id).await?;
        ctx.reply_formatted(
            channel,
            &event.event_id,
            render_reminder_list(&reminders, channel.timezone.as_deref()),
            Record::new(channel, MessageType::ReminderList),
        );
        Ok(())
    }
}

pub struct ListCommandsAction;

#[async_trait]
impl Action for ListCommandsAction {
    fn name(&self) -> &'static str {
        "List all commands"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["show all commands", "list the commands", "commands"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(^(show|list)( all| the| my)( command| commands)$|commands)"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.reply_formatted(
            channel,
            &event.event_id,
            render_command_list(&ctx.registry),
            Record::new(channel, MessageType::Commands),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handlers::standard_registry;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_reminder_list() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let reminder = Reminder {
            id: 4,
            channel_id: 1,
            message: "Water plants".to_string(),
            remind_at: at,
            active: true,
            repeat_interval: 1440,
            repeat_max: 10,
            repeated: 0,
            created_at: at,
            resource_id: None,
        };

        let (plain, _) = render_reminder_list(&[reminder], None);
        assert_eq!(
            plain,
            "== OPEN REMINDERS ==\nYou asked for your open reminders, here they are:\n\nWATER PLANTS\nID 4 at 08:00 01.02.2026 (UTC) 🔄\n\n"
        );
    }

    #[test]
    fn test_command_list_covers_registry() {
        let registry = standard_registry().unwrap();
        let (plain, html) = render_command_list(&registry);

        assert!(plain.starts_with("== AVAILABLE COMMANDS =="));
        assert!(plain.contains("SET A TIMEZONE"));
        assert!(plain.contains("- Go shopping in 4 hours"));
        assert!(plain.contains("==== REACTIONS ===="));
        assert!(plain.contains("Available for Daily Reminder Messages. Give the message one of these reactions: ❌"));
        assert!(html.contains("<b>Make a new Reminder</b>"));
    }
}
