use async_trait::async_trait;

use crate::ChannelError;
use crate::ChatId;
use crate::MessageId;
use crate::ReplyActions;
use crate::Surface;

/// Outbound operations on a chat channel.
///
/// `text` is always markup in the channel's HTML subset (`b`, `i`, `code`,
/// `pre`) and at most [`crate::MAX_MESSAGE_CHARS`] long.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        actions: Option<&ReplyActions>,
    ) -> Result<MessageId, ChannelError>;

    async fn edit_message_text(
        &self,
        surface: Surface,
        text: &str,
        actions: Option<&ReplyActions>,
    ) -> Result<(), ChannelError>;

    async fn delete_message(&self, surface: Surface) -> Result<(), ChannelError>;
}
