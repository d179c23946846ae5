//! Ordered action registry
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 2.0.0: Ordered regex tables for message, reply and reaction actions
//! - 1.0.0: Initial implementation for handler dispatch

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;

use super::handler::{Action, ReactionAction, ReactionScope, ReplyAction};
use crate::database::MessageType;

/// Registry holding every action in registration order
///
/// Registration order is the only tie-break between actions whose patterns both match;
/// the first match wins.
///
/// # Example
///
/// ```ignore
/// let mut registry = ActionRegistry::new();
/// registry.register_action(Arc::new(ListRemindersAction))?;
/// registry.register_reaction(ReactionScope::Type(MessageType::Reminder), Arc::new(DoneReaction));
///
/// if let Some(action) = registry.match_action("list") {
///     action.handle(&ctx, &event, &channel).await?;
/// }
/// ```
#[derive(Clone)]
pub struct ActionRegistry {
    actions: Vec<(Regex, Arc<dyn Action>)>,
    reply_actions: Vec<(Regex, Arc<dyn ReplyAction>)>,
    reaction_actions: Vec<(ReactionScope, Arc<dyn ReactionAction>)>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            reply_actions: Vec::new(),
            reaction_actions: Vec::new(),
        }
    }

    /// Append a message action; fails on an invalid pattern
    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<()> {
        let regex = Regex::new(action.pattern())
            .with_context(|| format!("Invalid pattern for action {}", action.name()))?;
        self.actions.push((regex, action));
        Ok(())
    }

    pub fn register_reply(&mut self, action: Arc<dyn ReplyAction>) -> Result<()> {
        let regex = Regex::new(action.pattern())
            .with_context(|| format!("Invalid pattern for reply action {}", action.name()))?;
        self.reply_actions.push((regex, action));
        Ok(())
    }

    pub fn register_reaction(&mut self, scope: ReactionScope, action: Arc<dyn ReactionAction>) {
        self.reaction_actions.push((scope, action));
    }

    /// First message action whose pattern matches `text`
    pub fn match_action(&self, text: &str) -> Option<Arc<dyn Action>> {
        let text = text.to_lowercase();
        self.actions
            .iter()
            .find(|(regex, _)| regex.is_match(&text))
            .map(|(_, action)| Arc::clone(action))
    }

    /// First reply action for `replied_type` whose pattern matches `text`
    pub fn match_reply(&self, replied_type: MessageType, text: &str) -> Option<Arc<dyn ReplyAction>> {
        let text = text.to_lowercase();
        self.reply_actions
            .iter()
            .filter(|(_, action)| action.reply_to_types().contains(&replied_type))
            .find(|(regex, _)| regex.is_match(&text))
            .map(|(_, action)| Arc::clone(action))
    }

    /// Reaction candidates for a message type and emoji, in registration order
    pub fn reaction_candidates(
        &self,
        message_type: MessageType,
        key: &str,
    ) -> Vec<Arc<dyn ReactionAction>> {
        self.reaction_actions
            .iter()
            .filter(|(scope, _)| scope.covers(message_type))
            .filter(|(_, action)| action.keys().contains(&key))
            .map(|(_, action)| Arc::clone(action))
            .collect()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.iter().map(|(_, action)| action)
    }

    pub fn reply_actions(&self) -> impl Iterator<Item = &Arc<dyn ReplyAction>> {
        self.reply_actions.iter().map(|(_, action)| action)
    }

    pub fn reaction_actions(&self) -> impl Iterator<Item = &(ReactionScope, Arc<dyn ReactionAction>)> {
        self.reaction_actions.iter()
    }

    /// Number of registered actions of all three kinds
    pub fn len(&self) -> usize {
        self.actions.len() + self.reply_actions.len() + self.reaction_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::ActionContext;
    use crate::commands::event::{MessageEvent, ReactionEvent};
    use crate::database::{Channel, Message};
    use async_trait::async_trait;

    struct MockAction {
        name: &'static str,
        pattern: &'static str,
    }

    #[async_trait]
    impl Action for MockAction {
        fn name(&self) -> &'static str {
            self.name
        }

        fn examples(&self) -> &'static [&'static str] {
            &[]
        }

        fn pattern(&self) -> &'static str {
            self.pattern
        }

        async fn handle(&self, _: &ActionContext, _: &MessageEvent, _: &Channel) -> Result<()> {
            Ok(())
        }
    }

    struct MockReply;

    #[async_trait]
    impl ReplyAction for MockReply {
        fn name(&self) -> &'static str {
            "reply"
        }

        fn examples(&self) -> &'static [&'static str] {
            &[]
        }

        fn pattern(&self) -> &'static str {
            "(?i)^delete$"
        }

        fn reply_to_types(&self) -> &'static [MessageType] {
            &[MessageType::Reminder]
        }

        async fn handle(
            &self,
            _: &ActionContext,
            _: &MessageEvent,
            _: &Channel,
            _: &Message,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct MockReaction(&'static str);

    #[async_trait]
    impl ReactionAction for MockReaction {
        fn name(&self) -> &'static str {
            self.0
        }

        fn keys(&self) -> &[&'static str] {
            &["❌"]
        }

        async fn handle(
            &self,
            _: &ActionContext,
            _: &ReactionEvent,
            _: Option<&Channel>,
            _: &Message,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ActionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(ActionRegistry::default().is_empty());
    }

    #[test]
    fn test_first_registered_match_wins() {
        let mut registry = ActionRegistry::new();
        registry
            .register_action(Arc::new(MockAction { name: "first", pattern: "(?i)list" }))
            .unwrap();
        registry
            .register_action(Arc::new(MockAction { name: "second", pattern: "(?i)^list$" }))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.match_action("LIST").unwrap().name(), "first");
        assert!(registry.match_action("nothing").is_none());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut registry = ActionRegistry::new();
        let result = registry.register_action(Arc::new(MockAction { name: "bad", pattern: "(" }));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reply_match_respects_types() {
        let mut registry = ActionRegistry::new();
        registry.register_reply(Arc::new(MockReply)).unwrap();

        assert!(registry.match_reply(MessageType::Reminder, "Delete").is_some());
        assert!(registry.match_reply(MessageType::DailyReminder, "delete").is_none());
        assert!(registry.match_reply(MessageType::Reminder, "delete it").is_none());
    }

    #[test]
    fn test_reaction_candidates_in_order() {
        let mut registry = ActionRegistry::new();
        registry.register_reaction(ReactionScope::Type(MessageType::Reminder), Arc::new(MockReaction("a")));
        registry.register_reaction(ReactionScope::Type(MessageType::DailyReminder), Arc::new(MockReaction("b")));
        registry.register_reaction(ReactionScope::AllTypes, Arc::new(MockReaction("c")));

        let names: Vec<_> = registry
            .reaction_candidates(MessageType::Reminder, "❌")
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(registry.reaction_candidates(MessageType::Reminder, "✅").is_empty());
    }
}
