//! Conversation hub: the single write surface and subscription broker.
//!
//! Every mutation goes through the hub, which serializes on the shared
//! store mutex, and on success reads the conversation's full ordered
//! snapshot and enqueues it to every watcher while still holding the lock.
//! Enqueue order therefore matches commit order, and each subscriber's
//! dedicated delivery task drains its own FIFO queue, so a single
//! subscriber never observes reordered snapshots.  Callbacks run on the
//! delivery task, never on the writer's thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use causerie_store::{
    Conversation, ConversationId, Database, Message, MessageDraft, MessageId, Result, StoreError,
    UserId,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::snapshot::ConversationSnapshot;
use crate::subscription::{DeliveryGate, Subscription};

/// One registered subscriber's delivery queue.
struct Watcher {
    id: u64,
    tx: mpsc::UnboundedSender<ConversationSnapshot>,
}

/// State shared between the hub handle and its [`Subscription`]s.
pub(crate) struct HubInner {
    db: Arc<Mutex<Database>>,
    watchers: Mutex<HashMap<ConversationId, Vec<Watcher>>>,
    next_watcher: AtomicU64,
}

impl HubInner {
    fn store(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Drop one watcher's registration, stopping further enqueues for it.
    pub(crate) fn remove_watcher(&self, conversation: ConversationId, id: u64) {
        let mut watchers = match self.watchers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(list) = watchers.get_mut(&conversation) {
            list.retain(|w| w.id != id);
            if list.is_empty() {
                watchers.remove(&conversation);
            }
        }
    }

    /// Fan the current snapshot of `conversation` out to its watchers.
    ///
    /// Must be called with the store lock held, so that enqueue order
    /// across all watchers matches commit order.
    fn notify(&self, db: &Database, conversation: ConversationId) -> Result<()> {
        let mut watchers = self.watchers.lock().map_err(|_| StoreError::LockPoisoned)?;
        let Some(list) = watchers.get_mut(&conversation) else {
            return Ok(());
        };

        let snapshot =
            ConversationSnapshot::new(conversation, db.messages_for_conversation(conversation)?);
        // A closed channel means the delivery task is gone; drop the watcher.
        list.retain(|w| w.tx.send(snapshot.clone()).is_ok());
        debug!(
            conversation = %conversation,
            watchers = list.len(),
            messages = snapshot.len(),
            "snapshot fanned out"
        );
        if list.is_empty() {
            watchers.remove(&conversation);
        }
        Ok(())
    }
}

/// Handle to the sync layer.
///
/// Cheap to clone; all clones share the same store and watcher registry.
/// [`ConversationHub::subscribe`] spawns a tokio task per subscription and
/// therefore must be called from within a tokio runtime.
#[derive(Clone)]
pub struct ConversationHub {
    inner: Arc<HubInner>,
}

impl ConversationHub {
    /// Create a hub over a shared store handle.
    ///
    /// The mutex is shared with any other writer (such as the session
    /// layer's presence updates) so that all store access serializes.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                db,
                watchers: Mutex::new(HashMap::new()),
                next_watcher: AtomicU64::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Membership operations (no message snapshot changes, no fan-out)
    // ------------------------------------------------------------------

    /// Resolve or lazily create the direct conversation for a user pair.
    pub fn get_or_create_direct(&self, a: UserId, b: UserId) -> Result<Conversation> {
        self.inner.store()?.get_or_create_direct(a, b)
    }

    /// Create a group conversation.
    pub fn create_group(
        &self,
        creator: UserId,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<Conversation> {
        self.inner.store()?.create_group(creator, name, member_ids)
    }

    /// Merge new members into a group conversation.
    pub fn add_members(
        &self,
        conversation: ConversationId,
        new_member_ids: &[UserId],
    ) -> Result<Conversation> {
        self.inner.store()?.add_members(conversation, new_member_ids)
    }

    // ------------------------------------------------------------------
    // Message operations (fan out the updated snapshot)
    // ------------------------------------------------------------------

    /// Append a message and push the updated snapshot to all watchers.
    pub fn send_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        draft: &MessageDraft,
    ) -> Result<Message> {
        let mut db = self.inner.store()?;
        let message = db.send_message(conversation, sender, draft)?;
        self.inner.notify(&db, conversation)?;
        Ok(message)
    }

    /// Edit a message's text and push the updated snapshot.
    pub fn edit_message(&self, id: MessageId, editor: UserId, new_text: &str) -> Result<Message> {
        let mut db = self.inner.store()?;
        let message = db.edit_message(id, editor, new_text)?;
        self.inner.notify(&db, message.conversation_id)?;
        Ok(message)
    }

    /// Soft-delete a message and push the updated snapshot.
    ///
    /// Deleting an already-deleted message is a no-op and fans nothing out,
    /// since no state changed.
    pub fn delete_message(&self, id: MessageId, requester: UserId) -> Result<Message> {
        let mut db = self.inner.store()?;
        let already_deleted = db.message(id)?.deleted;
        let message = db.soft_delete_message(id, requester)?;
        if !already_deleted {
            self.inner.notify(&db, message.conversation_id)?;
        }
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetch a conversation by id.
    pub fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.inner.store()?.conversation(id)
    }

    /// The full ordered message log of a conversation.
    pub fn messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        self.inner.store()?.messages_for_conversation(conversation)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to a conversation's snapshot stream.
    ///
    /// `on_change` is invoked with the current snapshot immediately (an
    /// empty one if the conversation does not exist yet) and again after
    /// every message create, edit, or first delete in that conversation.
    /// Invocations happen on a dedicated tokio task, in commit order, and
    /// stop once the returned [`Subscription`] is cancelled or dropped.
    pub fn subscribe<F>(&self, conversation: ConversationId, on_change: F) -> Result<Subscription>
    where
        F: Fn(ConversationSnapshot) + Send + 'static,
    {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(DeliveryGate::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            // Initial snapshot and registration happen under the store lock
            // so no write can slip in between them: the first delivery plus
            // the per-change deliveries cover every change exactly once.
            let db = self.inner.store()?;
            let initial = ConversationSnapshot::new(
                conversation,
                db.messages_for_conversation(conversation)?,
            );
            let _ = tx.send(initial);

            let mut watchers = self.inner.watchers.lock().map_err(|_| StoreError::LockPoisoned)?;
            watchers
                .entry(conversation)
                .or_default()
                .push(Watcher { id, tx });
        }

        let task_gate = Arc::clone(&gate);
        tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                let Ok(guard) = task_gate.delivering.lock() else {
                    break;
                };
                if task_gate.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                on_change(snapshot);
                drop(guard);
            }
            debug!(subscription = id, "delivery task finished");
        });

        info!(subscription = id, conversation = %conversation, "subscription established");

        Ok(Subscription {
            id,
            conversation_id: conversation,
            hub: Arc::downgrade(&self.inner),
            gate,
        })
    }

    #[cfg(test)]
    fn watcher_count(&self, conversation: ConversationId) -> usize {
        self.inner
            .watchers
            .lock()
            .map(|w| w.get(&conversation).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Route hub tracing through the test harness; `RUST_LOG` filters it.
    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn test_hub() -> (tempfile::TempDir, ConversationHub) {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, ConversationHub::new(Arc::new(Mutex::new(db))))
    }

    /// Subscribe with a callback that forwards snapshots to a std channel.
    fn channel_subscriber(
        hub: &ConversationHub,
        conversation: ConversationId,
    ) -> (Subscription, std_mpsc::Receiver<ConversationSnapshot>) {
        let (tx, rx) = std_mpsc::channel();
        let sub = hub
            .subscribe(conversation, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .unwrap();
        (sub, rx)
    }

    fn recv(rx: &std_mpsc::Receiver<ConversationSnapshot>) -> ConversationSnapshot {
        rx.recv_timeout(Duration::from_secs(5)).expect("delivery")
    }

    fn assert_silent(rx: &std_mpsc::Receiver<ConversationSnapshot>) {
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscriber_sees_send_then_delete() {
        let (_dir, hub) = test_hub();
        let (u1, u2) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(u1, u2).unwrap();

        let (_sub, rx) = channel_subscriber(&hub, conv.id);
        assert!(recv(&rx).is_empty());

        let sent = hub.send_message(conv.id, u1, &MessageDraft::text("hi")).unwrap();
        let after_send = recv(&rx);
        assert_eq!(after_send.messages.len(), 1);
        assert_eq!(after_send.messages[0].text, "hi");
        assert!(!after_send.messages[0].deleted);

        hub.delete_message(sent.id, u1).unwrap();
        let after_delete = recv(&rx);
        assert_eq!(after_delete.messages.len(), 1);
        assert_eq!(after_delete.messages[0].text, "");
        assert!(after_delete.messages[0].deleted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deliveries_follow_commit_order() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();

        let (_sub, rx) = channel_subscriber(&hub, conv.id);
        assert!(recv(&rx).is_empty());

        for i in 0..10 {
            hub.send_message(conv.id, a, &MessageDraft::text(format!("m{i}")))
                .unwrap();
        }

        // One snapshot per send, each one message longer, always in order.
        for expected_len in 1..=10 {
            let snapshot = recv(&rx);
            assert_eq!(snapshot.messages.len(), expected_len);
            for pair in snapshot.messages.windows(2) {
                assert!(pair[0].created_at < pair[1].created_at);
            }
            assert_eq!(
                snapshot.messages.last().unwrap().text,
                format!("m{}", expected_len - 1)
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_senders_keep_a_total_order() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();

        let handles: Vec<_> = [(a, "a"), (b, "b")]
            .into_iter()
            .map(|(sender, tag)| {
                let hub = hub.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        hub.send_message(conv.id, sender, &MessageDraft::text(format!("{tag}{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = hub.messages(conv.id).unwrap();
        assert_eq!(log.len(), 40);
        for pair in log.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_stops_deliveries() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();

        let (sub, rx) = channel_subscriber(&hub, conv.id);
        assert!(recv(&rx).is_empty());
        assert_eq!(hub.watcher_count(conv.id), 1);

        sub.cancel();
        assert_eq!(hub.watcher_count(conv.id), 0);

        hub.send_message(conv.id, a, &MessageDraft::text("after")).unwrap();
        assert_silent(&rx);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscribers_are_independent() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();

        let (sub1, rx1) = channel_subscriber(&hub, conv.id);
        let (_sub2, rx2) = channel_subscriber(&hub, conv.id);
        assert!(recv(&rx1).is_empty());
        assert!(recv(&rx2).is_empty());

        drop(sub1);

        hub.send_message(conv.id, a, &MessageDraft::text("still live")).unwrap();
        assert_silent(&rx1);
        assert_eq!(recv(&rx2).messages.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn repeated_delete_fans_out_once() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();
        let sent = hub.send_message(conv.id, a, &MessageDraft::text("bye")).unwrap();

        let (_sub, rx) = channel_subscriber(&hub, conv.id);
        assert_eq!(recv(&rx).messages.len(), 1);

        hub.delete_message(sent.id, a).unwrap();
        assert!(recv(&rx).messages[0].deleted);

        // Second delete is a no-op with no notification.
        hub.delete_message(sent.id, a).unwrap();
        assert_silent(&rx);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn membership_changes_do_not_notify() {
        let (_dir, hub) = test_hub();
        let (creator, m1, m2, m3) = (UserId::new(), UserId::new(), UserId::new(), UserId::new());
        let group = hub.create_group(creator, "Team", &[m1, m2]).unwrap();

        let (_sub, rx) = channel_subscriber(&hub, group.id);
        assert!(recv(&rx).is_empty());

        let grown = hub.add_members(group.id, &[m3]).unwrap();
        assert!(grown.members.contains(&m3));
        assert_silent(&rx);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscribing_before_the_conversation_exists_is_allowed() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let pair_id = ConversationId::direct_between(a, b);

        let (_sub, rx) = channel_subscriber(&hub, pair_id);
        assert!(recv(&rx).is_empty());

        let conv = hub.get_or_create_direct(a, b).unwrap();
        assert_eq!(conv.id, pair_id);
        hub.send_message(conv.id, a, &MessageDraft::text("first")).unwrap();
        assert_eq!(recv(&rx).messages.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_errors_surface_through_the_hub() {
        let (_dir, hub) = test_hub();
        let (a, b) = (UserId::new(), UserId::new());
        let conv = hub.get_or_create_direct(a, b).unwrap();

        assert!(matches!(
            hub.send_message(conv.id, UserId::new(), &MessageDraft::text("hi")),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            hub.send_message(conv.id, a, &MessageDraft::text("  ")),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            hub.delete_message(MessageId::new(), a),
            Err(StoreError::NotFound)
        ));
    }
}
