//! # causerie-sync
//!
//! In-process sync layer for the Causerie messaging core.
//!
//! [`ConversationHub`] serializes all writes over the shared store and fans
//! the affected conversation's full ordered snapshot out to every
//! subscriber.  [`Subscription`] handles cancel synchronously: once
//! `cancel` (or the drop) returns, the callback will not run again.

pub mod hub;
pub mod snapshot;
pub mod subscription;

pub use hub::ConversationHub;
pub use snapshot::ConversationSnapshot;
pub use subscription::Subscription;
