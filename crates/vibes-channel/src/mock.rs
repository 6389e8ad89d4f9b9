use std::collections::VecDeque;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use vibes_common::mutex_lock_or_recover;

use crate::ChannelError;
use crate::ChatId;
use crate::MessageChannel;
use crate::MessageId;
use crate::ReplyActions;
use crate::Surface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Send {
        chat_id: ChatId,
        text: String,
        actions: Option<ReplyActions>,
    },
    Edit {
        surface: Surface,
        text: String,
        actions: Option<ReplyActions>,
        accepted: bool,
    },
    Delete {
        surface: Surface,
    },
}

/// A scripted [`MessageChannel`] for tests.
///
/// Every call is recorded. Failures queued with [`MockChannel::fail_next_edit`]
/// are returned in order before edits start succeeding again.
#[derive(Clone)]
pub struct MockChannel {
    calls: Arc<Mutex<Vec<ChannelCall>>>,
    edit_failures: Arc<Mutex<VecDeque<ChannelError>>>,
    send_failures: Arc<Mutex<VecDeque<ChannelError>>>,
    send_delay: Arc<Mutex<Option<Duration>>>,
    next_message_id: Arc<AtomicI64>,
    changed: Arc<Notify>,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            edit_failures: Arc::new(Mutex::new(VecDeque::new())),
            send_failures: Arc::new(Mutex::new(VecDeque::new())),
            send_delay: Arc::new(Mutex::new(None)),
            next_message_id: Arc::new(AtomicI64::new(1000)),
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn fail_next_edit(&self, error: ChannelError) {
        mutex_lock_or_recover(&self.edit_failures).push_back(error);
    }

    pub fn fail_next_send(&self, error: ChannelError) {
        mutex_lock_or_recover(&self.send_failures).push_back(error);
    }

    /// Makes every later `send_message` take `delay` after it is recorded.
    pub fn delay_sends(&self, delay: Duration) {
        *mutex_lock_or_recover(&self.send_delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        mutex_lock_or_recover(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        mutex_lock_or_recover(&self.calls).clear();
    }

    /// Texts of edits the channel accepted, in order.
    pub fn accepted_edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Edit {
                    text,
                    accepted: true,
                    ..
                } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of edit attempts, failed ones included.
    pub fn edit_attempts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ChannelCall::Edit { .. }))
            .count()
    }

    pub fn last_accepted_edit(&self) -> Option<String> {
        self.accepted_edits().pop()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Waits until at least `count` edits have been accepted.
    pub async fn wait_for_accepted_edits(&self, count: usize) {
        loop {
            let notified = self.changed.notified();
            if self.accepted_edits().len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, call: ChannelCall) {
        mutex_lock_or_recover(&self.calls).push(call);
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl MessageChannel for MockChannel {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        actions: Option<&ReplyActions>,
    ) -> Result<MessageId, ChannelError> {
        self.record(ChannelCall::Send {
            chat_id,
            text: text.to_string(),
            actions: actions.cloned(),
        });
        let delay = *mutex_lock_or_recover(&self.send_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = mutex_lock_or_recover(&self.send_failures).pop_front() {
            return Err(error);
        }
        Ok(MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed)))
    }

    async fn edit_message_text(
        &self,
        surface: Surface,
        text: &str,
        actions: Option<&ReplyActions>,
    ) -> Result<(), ChannelError> {
        let failure = mutex_lock_or_recover(&self.edit_failures).pop_front();
        self.record(ChannelCall::Edit {
            surface,
            text: text.to_string(),
            actions: actions.cloned(),
            accepted: failure.is_none(),
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn delete_message(&self, surface: Surface) -> Result<(), ChannelError> {
        self.record(ChannelCall::Delete { surface });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_edit_failures_are_consumed_in_order() {
        let channel = MockChannel::new();
        let surface = Surface::new(ChatId(1), MessageId(2));
        channel.fail_next_edit(ChannelError::NotModified);

        assert_eq!(
            channel.edit_message_text(surface, "a", None).await,
            Err(ChannelError::NotModified)
        );
        assert_eq!(channel.edit_message_text(surface, "b", None).await, Ok(()));
        assert_eq!(channel.edit_attempts(), 2);
        assert_eq!(channel.accepted_edits(), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_sends_are_recorded_before_they_complete() {
        let channel = MockChannel::new();
        channel.delay_sends(Duration::from_secs(5));

        let send = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send_message(ChatId(1), "hello", None).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(channel.sent_texts(), vec!["hello".to_string()]);
        assert!(!send.is_finished());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(send.await.unwrap(), Ok(MessageId(1000)));
    }

    #[tokio::test]
    async fn send_allocates_increasing_ids() {
        let channel = MockChannel::new();
        let first = channel.send_message(ChatId(1), "x", None).await.unwrap();
        let second = channel.send_message(ChatId(1), "y", None).await.unwrap();
        assert!(second > first);
        assert_eq!(channel.sent_texts(), vec!["x", "y"]);
    }
}
