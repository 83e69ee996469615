//! The auth provider seam.
//!
//! Production embeddings back this trait with their real identity service;
//! [`MemoryAuth`](crate::memory::MemoryAuth) backs it in-process for
//! development and tests.  The session layer only ever talks to the trait.

use std::sync::Arc;

use causerie_store::UserId;

use crate::error::AuthError;

/// A sign-in state transition observed at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityEvent {
    /// The user established a session.
    SignedIn(UserId),
    /// The user's session ended, explicitly or by termination.
    SignedOut(UserId),
}

/// Opaque handle to a registered identity listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked on every identity transition.
pub type IdentityListener = Arc<dyn Fn(IdentityEvent) + Send + Sync>;

/// Account credential operations the session layer requires.
///
/// Object-safe so managers can hold `Arc<dyn AuthProvider>`.  Credential
/// storage, verification strength, and uniqueness enforcement are entirely
/// the implementation's concern; the session layer only consumes the
/// resulting [`UserId`]s and transition events.
pub trait AuthProvider: Send + Sync {
    /// Create an account and sign it in.
    ///
    /// Fails with [`AuthError::EmailInUse`] when the email is taken.
    fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    /// Sign an existing account in.
    ///
    /// Fails with [`AuthError::InvalidCredentials`] on unknown email or
    /// wrong password; implementations must not reveal which.
    fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    /// End a user's session.
    ///
    /// Fails with [`AuthError::NotSignedIn`] when no session is active.
    fn sign_out(&self, user: UserId) -> Result<(), AuthError>;

    /// Register a listener for identity transitions.
    fn on_identity_change(&self, listener: IdentityListener) -> ListenerId;

    /// Deregister a listener; unknown ids are a no-op.
    fn remove_identity_listener(&self, id: ListenerId);
}
