//! # Delivery Module
//!
//! Everything between "the bot wants to say something" and the chat transport: the
//! transport contract, the shared rate-limit gate, the retrier and the messenger facade.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial delivery layer

pub mod messenger;
pub mod rate_limit;
pub mod retrier;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use messenger::{Messenger, Record};
pub use rate_limit::RateLimitGate;
pub use retrier::{DeliveryError, DeliveryRetrier, DeliveryTicket, RetryPolicy};
pub use transport::{OutgoingMessage, Transport, TransportError};
