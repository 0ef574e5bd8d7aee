//! Messaging transport contract and the Telegram Bot API client.
//!
//! The executor only consumes the [`ChatTransport`] trait; the Bot API
//! implementation shells out to `curl` so the daemon carries no HTTP stack
//! of its own.

pub mod error;
pub mod telegram;
pub mod types;

pub use error::*;
pub use telegram::*;
pub use types::*;
