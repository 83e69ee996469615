//! Session lifecycle: registration, sign-in, sign-out, presence wiring.
//!
//! The manager owns the auth provider seam and the shared store handle.
//! Session-start and explicit sign-out presence writes go through the
//! bounded retry helper and surface their errors; the termination path
//! (a dropped [`Session`]) is a single best-effort attempt that logs and
//! swallows failures, so tearing a client down never blocks or panics.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use causerie_store::retry::{retry_transient, RetryPolicy};
use causerie_store::{Database, Gender, NewProfile, StoreError, UserId};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::provider::{AuthProvider, IdentityEvent, ListenerId};

/// Input to [`SessionManager::register`].
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub full_name: String,
    pub gender: Gender,
    pub email: String,
    pub password: String,
}

struct ManagerInner {
    auth: Arc<dyn AuthProvider>,
    db: Arc<Mutex<Database>>,
    retry: RetryPolicy,
    /// Users with a live [`Session`] that has not been explicitly closed.
    active: Mutex<HashSet<UserId>>,
}

impl ManagerInner {
    fn store(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn remove_active(&self, user: UserId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user)
    }

    fn mark_online_with_retry(&self, user: UserId) -> Result<(), StoreError> {
        retry_transient(&self.retry, || self.store()?.mark_online(user))
    }

    fn mark_offline_with_retry(&self, user: UserId) -> Result<(), StoreError> {
        retry_transient(&self.retry, || self.store()?.mark_offline(user))
    }

    /// Termination path: the provider saw a sign-out the manager did not
    /// initiate (another tab, a dropped session).  One offline attempt,
    /// failures logged and swallowed.
    fn on_terminated(&self, user: UserId) {
        if !self.remove_active(user) {
            return;
        }
        match self.store().and_then(|mut db| db.mark_offline(user)) {
            Ok(()) => debug!(user = %user, "user marked offline on termination"),
            Err(e) => warn!(user = %user, error = %e, "best-effort offline update failed"),
        }
    }
}

/// Ties an [`AuthProvider`] to the store: registration, sign-in, and the
/// presence transitions that go with them.
pub struct SessionManager {
    inner: Arc<ManagerInner>,
    listener: ListenerId,
}

impl SessionManager {
    /// Create a manager over a provider and a shared store handle.
    ///
    /// Registers one identity listener for the manager's lifetime; it
    /// handles the termination path for sessions this manager opened.
    pub fn new(auth: Arc<dyn AuthProvider>, db: Arc<Mutex<Database>>) -> Self {
        let inner = Arc::new(ManagerInner {
            auth: Arc::clone(&auth),
            db,
            retry: RetryPolicy::default(),
            active: Mutex::new(HashSet::new()),
        });

        let weak = Arc::downgrade(&inner);
        let listener = auth.on_identity_change(Arc::new(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match event {
                IdentityEvent::SignedIn(user) => debug!(user = %user, "identity signed in"),
                IdentityEvent::SignedOut(user) => inner.on_terminated(user),
            }
        }));

        Self { inner, listener }
    }

    /// Register a new account: sign up at the provider, write the
    /// directory profile, mark the user online, return a live session.
    pub fn register(&self, account: NewAccount) -> Result<Session, SessionError> {
        let full_name = account.full_name.trim();
        let email = account.email.trim();
        if full_name.is_empty() {
            return Err(SessionError::Validation("full name is required".into()));
        }
        if email.is_empty() {
            return Err(SessionError::Validation("email is required".into()));
        }
        if account.password.trim().is_empty() {
            return Err(SessionError::Validation("password is required".into()));
        }

        let user = self.inner.auth.sign_up(email, &account.password)?;
        self.inner.store()?.create_profile(&NewProfile {
            id: user,
            full_name: full_name.to_string(),
            gender: account.gender,
            email: email.to_string(),
        })?;
        self.inner.mark_online_with_retry(user)?;

        info!(user = %user, "account registered");
        Ok(self.open_session(user))
    }

    /// Sign an existing account in and mark it online.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let user = self.inner.auth.sign_in(email, password)?;
        self.inner.mark_online_with_retry(user)?;

        info!(user = %user, "signed in");
        Ok(self.open_session(user))
    }

    fn open_session(&self, user: UserId) -> Session {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user);
        Session {
            user,
            inner: Arc::clone(&self.inner),
            closed: false,
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.inner.auth.remove_identity_listener(self.listener);
    }
}

/// A live sign-in.
///
/// Identity stays explicit: callers pass [`Session::user_id`] into every
/// store and hub operation themselves.  Dropping a session without calling
/// [`Session::sign_out`] takes the best-effort termination path.
pub struct Session {
    user: UserId,
    inner: Arc<ManagerInner>,
    closed: bool,
}

impl Session {
    /// The signed-in user.
    pub fn user_id(&self) -> UserId {
        self.user
    }

    /// Explicit sign-out: mark offline (with retry, errors surfaced),
    /// then end the provider session.
    ///
    /// On error the session stays open so the caller can retry; once this
    /// returns `Ok` the session is closed and dropping it is a no-op.
    pub fn sign_out(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }

        self.inner.mark_offline_with_retry(self.user)?;
        // Deregister first so the identity listener does not write a
        // second offline mark for this same transition.
        self.inner.remove_active(self.user);
        self.inner.auth.sign_out(self.user)?;
        self.closed = true;

        info!(user = %self.user, "signed out");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.inner.auth.sign_out(self.user) {
            warn!(user = %self.user, error = %e, "provider sign-out on drop failed");
        }
        // The manager's identity listener normally marks the user offline;
        // if it did not run, fall back to one direct attempt.
        if self.inner.remove_active(self.user) {
            if let Err(e) = self.inner.store().and_then(|mut db| db.mark_offline(self.user)) {
                warn!(user = %self.user, error = %e, "best-effort offline update failed");
            }
        }
    }
}
