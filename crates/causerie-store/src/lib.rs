//! # causerie-store
//!
//! Local storage for the Causerie messaging core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the user directory,
//! conversations and their membership sets, the message log, and presence.
//! Message timestamps are assigned by the store and are strictly monotonic
//! within each conversation, so the log order is total and stable.

pub mod conversations;
pub mod database;
pub mod directory;
pub mod ids;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod retry;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use ids::{ConversationId, MessageId, UserId};
pub use models::*;
