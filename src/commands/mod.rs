//! # Command System
//!
//! Chat-driven commands: free-text reminders, regex matched actions, replies to recorded
//! messages and emoji reactions.
//!
//! - **Version**: 3.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 3.0.0: Message, reply and reaction actions behind an ordered registry and router
//! - 2.1.0: Add modular handler infrastructure (handler trait, context, registry)
//! - 1.0.0: Initial reorganization with modular command structure

pub mod context;
pub mod event;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod router;

#[cfg(test)]
pub mod testing;

pub use context::ActionContext;
pub use event::{MessageEvent, ReactionEvent};
pub use handler::{Action, ReactionAction, ReactionScope, ReplyAction};
pub use handlers::standard_registry;
pub use registry::ActionRegistry;
pub use router::{AccessPolicy, DispatchRouter};
