//! Delivery errors reported by a message channel.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Fallback delay when a rate-limit signal carries no usable value.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("rate limited, retry after {}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },
    #[error("message is not modified")]
    NotModified,
    #[error("message can no longer be edited: {0}")]
    MessageGone(String),
    #[error("message is too long ({len} chars)")]
    TooLong { len: usize },
    #[error("channel transport error: {0}")]
    Transport(String),
}

#[allow(clippy::expect_used)]
fn retry_after_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry after (\d+)").expect("retry pattern is a valid regex"))
}

impl ChannelError {
    /// Classifies a rejection description returned by a chat API.
    ///
    /// Unknown descriptions become [`ChannelError::Transport`].
    pub fn from_rejection(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("message is not modified") {
            return ChannelError::NotModified;
        }
        if let Some(caps) = retry_after_regex().captures(&lower) {
            let secs = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0);
            return ChannelError::rate_limited(Duration::from_secs(secs));
        }
        if lower.contains("too many requests") {
            return ChannelError::rate_limited(Duration::ZERO);
        }
        const GONE: [&str; 5] = [
            "message can't be edited",
            "message to edit not found",
            "message_id_invalid",
            "chat not found",
            "bot was blocked",
        ];
        if GONE.iter().any(|needle| lower.contains(needle)) {
            return ChannelError::MessageGone(description.to_string());
        }
        if lower.contains("message is too long") {
            return ChannelError::TooLong { len: 0 };
        }
        ChannelError::Transport(description.to_string())
    }

    /// A rate limit; zero delays are replaced with [`DEFAULT_RETRY_AFTER`].
    pub fn rate_limited(retry_after: Duration) -> Self {
        let retry_after = if retry_after.is_zero() {
            DEFAULT_RETRY_AFTER
        } else {
            retry_after
        };
        ChannelError::RateLimited { retry_after }
    }

    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::RateLimited { .. })
    }

    /// The target message is gone for good; further edits are pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ChannelError::MessageGone(_))
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            ChannelError::RateLimited { .. } => "The channel is throttling edits; output will catch up.",
            ChannelError::NotModified => "Nothing to do.",
            ChannelError::MessageGone(_) => "Attach the session to a new message to keep watching it.",
            ChannelError::TooLong { .. } => "Rendered output exceeded the channel limit; this is a bug.",
            ChannelError::Transport(_) => "Check connectivity to the chat service.",
        }
    }
}
