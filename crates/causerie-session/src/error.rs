use causerie_store::StoreError;
use thiserror::Error;

/// Errors produced by an [`AuthProvider`](crate::provider::AuthProvider).
#[derive(Error, Debug)]
pub enum AuthError {
    /// An account with this email already exists.
    #[error("Email is already in use")]
    EmailInUse,

    /// Unknown email or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The user has no active sign-in.
    #[error("Not signed in")]
    NotSignedIn,

    /// Failure inside a third-party provider implementation.
    #[error("Auth backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Errors produced by the session layer.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Registration input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The auth provider rejected the request.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The store rejected the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}
