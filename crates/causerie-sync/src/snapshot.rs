//! Snapshot payloads delivered to subscribers.

use std::sync::Arc;

use causerie_store::{ConversationId, Message};

/// The complete ordered message log of one conversation at one instant.
///
/// Subscribers always receive the full log, never deltas, so a consumer can
/// replace its view wholesale on every delivery.  The message list is shared
/// behind an [`Arc`]: fanning one change out to many subscribers clones a
/// pointer, not the log.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    /// Which conversation this snapshot describes.
    pub conversation_id: ConversationId,
    /// Messages in ascending store-timestamp order.
    pub messages: Arc<[Message]>,
}

impl ConversationSnapshot {
    pub(crate) fn new(conversation_id: ConversationId, messages: Vec<Message>) -> Self {
        Self {
            conversation_id,
            messages: messages.into(),
        }
    }

    /// Number of messages in the snapshot.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
