//! Subscription handles with synchronous cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use causerie_store::ConversationId;
use tracing::debug;

use crate::hub::HubInner;

/// Shared between a [`Subscription`] handle and its delivery task.
///
/// The delivery task holds `delivering` for the duration of each callback
/// and checks `cancelled` before invoking it.  Cancellation sets the flag
/// and then acquires `delivering`, which waits out an in-flight callback;
/// once the lock is obtained no further invocation can start.
pub(crate) struct DeliveryGate {
    pub(crate) cancelled: AtomicBool,
    pub(crate) delivering: Mutex<()>,
}

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            delivering: Mutex::new(()),
        }
    }
}

/// Live subscription to one conversation's snapshot stream.
///
/// Dropping the handle cancels it.  After [`Subscription::cancel`] (or the
/// drop) returns, the callback will not be invoked again; an in-flight
/// invocation is waited out first.  Calling `cancel` from inside the
/// callback itself is unsupported and would deadlock on that handshake.
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) conversation_id: ConversationId,
    pub(crate) hub: Weak<HubInner>,
    pub(crate) gate: Arc<DeliveryGate>,
}

impl Subscription {
    /// The conversation this subscription watches.
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Cancel the subscription.
    ///
    /// Synchronous from the caller's perspective: when this returns, no
    /// further callback invocation will happen and none is in flight.
    pub fn cancel(self) {
        // Drop performs the handshake.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Stop future enqueues; dropping the sender also ends the delivery
        // task once its queue drains.
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_watcher(self.conversation_id, self.id);
        }

        self.gate.cancelled.store(true, Ordering::SeqCst);

        // Wait out an in-flight callback.  A poisoned gate means the
        // callback panicked, which also means the delivery task is gone.
        drop(self.gate.delivering.lock());

        debug!(
            subscription = self.id,
            conversation = %self.conversation_id,
            "subscription cancelled"
        );
    }
}
