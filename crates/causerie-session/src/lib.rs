//! # causerie-session
//!
//! Identity and session lifecycle for the Causerie messaging core.
//!
//! Credentials live behind the [`AuthProvider`] trait; [`MemoryAuth`] is
//! the in-process implementation used for development and tests.
//! [`SessionManager`] ties a provider to the store: registration writes
//! the directory profile, sign-in and sign-out drive presence, and a
//! dropped [`Session`] marks its user offline best-effort.
//!
//! Identity is always explicit: every store operation takes the acting
//! [`UserId`](causerie_store::UserId) as an argument, never reads it from
//! ambient state.

pub mod manager;
pub mod memory;
pub mod provider;

mod error;

pub use error::{AuthError, SessionError};
pub use manager::{NewAccount, Session, SessionManager};
pub use memory::MemoryAuth;
pub use provider::{AuthProvider, IdentityEvent, IdentityListener, ListenerId};
