//! The chat channel as seen by the run engine.
//!
//! A channel delivers size-limited rich-text messages and lets the engine
//! edit them in place. [`MessageChannel`] is the port; implementations live
//! with the front end (the CLI ships a console one) and [`MockChannel`]
//! scripts failures for tests.

#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod channel;
mod error;
mod markup;
mod mock;
mod types;

pub use channel::MessageChannel;
pub use error::ChannelError;
pub use markup::escape_html;
pub use markup::escaped_len;
pub use markup::escaped_prefix;
pub use markup::escaped_suffix;
pub use markup::RichText;
pub use markup::Span;
pub use markup::Style;
pub use mock::ChannelCall;
pub use mock::MockChannel;
pub use types::ChatId;
pub use types::MessageId;
pub use types::ReplyAction;
pub use types::ReplyActions;
pub use types::Surface;

/// Hard per-message limit, in chars.
pub const MAX_MESSAGE_CHARS: usize = 4096;
