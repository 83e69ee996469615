//! In-memory [`AuthProvider`] for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use causerie_store::UserId;
use tracing::debug;

use crate::error::AuthError;
use crate::provider::{AuthProvider, IdentityEvent, IdentityListener, ListenerId};

struct Account {
    user: UserId,
    password: String,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    signed_in: HashSet<UserId>,
}

/// In-process account map with plaintext credential comparison.
///
/// Good enough for the development and test seam it exists for; real
/// embeddings provide their own [`AuthProvider`].  Identity listeners fire
/// synchronously on every transition, after internal locks are released,
/// so a listener may re-enter the provider.
#[derive(Default)]
pub struct MemoryAuth {
    state: Mutex<AuthState>,
    listeners: Mutex<HashMap<u64, IdentityListener>>,
    next_listener: AtomicU64,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: IdentityEvent) {
        let listeners: Vec<IdentityListener> = {
            let registry = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry.values().cloned().collect()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let email = email.trim().to_lowercase();
        let user = {
            let mut state = self.state();
            if state.accounts.contains_key(&email) {
                return Err(AuthError::EmailInUse);
            }
            let user = UserId::new();
            state.accounts.insert(
                email.clone(),
                Account {
                    user,
                    password: password.to_string(),
                },
            );
            state.signed_in.insert(user);
            user
        };

        debug!(user = %user, "account created");
        self.emit(IdentityEvent::SignedIn(user));
        Ok(user)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let email = email.trim().to_lowercase();
        let (user, fresh) = {
            let mut state = self.state();
            let account = state
                .accounts
                .get(&email)
                .filter(|a| a.password == password)
                .ok_or(AuthError::InvalidCredentials)?;
            let user = account.user;
            let fresh = state.signed_in.insert(user);
            (user, fresh)
        };

        if fresh {
            self.emit(IdentityEvent::SignedIn(user));
        }
        Ok(user)
    }

    fn sign_out(&self, user: UserId) -> Result<(), AuthError> {
        {
            let mut state = self.state();
            if !state.signed_in.remove(&user) {
                return Err(AuthError::NotSignedIn);
            }
        }

        self.emit(IdentityEvent::SignedOut(user));
        Ok(())
    }

    fn on_identity_change(&self, listener: IdentityListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        ListenerId(id)
    }

    fn remove_identity_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0);
    }
}
