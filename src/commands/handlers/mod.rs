//! Per-action handler implementations
//!
//! - **Version**: 3.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 3.1.0: Calendar import action
//! - 3.0.0: Chat actions for reminders, settings, calendar links and accounts
//! - 2.0.0: Reply and reaction actions
//! - 1.0.0: Initial extraction from monolithic command_handler.rs

pub mod account;
pub mod calendar;
pub mod listing;
pub mod reactions;
pub mod reminder;
pub mod replies;
pub mod settings;

use anyhow::Result;
use std::sync::Arc;

use super::handler::ReactionScope;
use super::registry::ActionRegistry;
use crate::database::MessageType;

pub use reminder::{create_reminder, reschedule_from_reply};

/// Build the registry with every action in dispatch order
pub fn standard_registry() -> Result<ActionRegistry> {
    let mut registry = ActionRegistry::new();

    registry.register_action(Arc::new(listing::ListRemindersAction))?;
    registry.register_action(Arc::new(listing::ListCommandsAction))?;
    registry.register_action(Arc::new(settings::TimezoneAction))?;
    registry.register_action(Arc::new(settings::SetDailyReminderAction))?;
    registry.register_action(Arc::new(settings::DeleteDailyReminderAction))?;
    registry.register_action(Arc::new(calendar::AddIcalAction))?;
    registry.register_action(Arc::new(calendar::CalendarLinkAction))?;
    registry.register_action(Arc::new(calendar::RenewCalendarSecretAction))?;
    registry.register_action(Arc::new(account::DeleteDataAction))?;
    registry.register_action(Arc::new(account::AddUserAction))?;
    registry.register_action(Arc::new(reminder::DeleteReminderAction))?;
    registry.register_action(Arc::new(reminder::ChangeReminderAction))?;

    registry.register_reply(Arc::new(replies::DeleteReply))?;
    registry.register_reply(Arc::new(replies::RecurringReply))?;

    let request = ReactionScope::Type(MessageType::ReminderRequest);
    let success = ReactionScope::Type(MessageType::ReminderSuccess);
    let fired = ReactionScope::Type(MessageType::Reminder);

    for scope in [request, success, fired] {
        registry.register_reaction(scope, Arc::new(reactions::DeleteReminderReaction));
    }
    for scope in [request, success, fired] {
        for action in reactions::AddTimeReaction::all() {
            registry.register_reaction(scope, Arc::new(action));
        }
    }
    registry.register_reaction(
        ReactionScope::Type(MessageType::DailyReminder),
        Arc::new(reactions::DeleteDailyReminderReaction),
    );
    registry.register_reaction(fired, Arc::new(reactions::DoneReaction));
    registry.register_reaction(fired, Arc::new(reactions::RescheduleReaction));

    Ok(registry)
}
