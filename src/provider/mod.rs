//! Collaborator seams consumed by the session store.
//!
//! DESIGN
//! ======
//! The store never talks HTTP itself. It depends on two traits: an
//! `IdentityProvider` that owns the session and pushes `AuthChange` events,
//! and a `ProfileStore` that maps an identity id to a role string. The
//! Supabase client in `supabase` implements both; tests use in-memory mocks.

pub mod supabase;

use tokio::sync::broadcast;

use crate::identity::Identity;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by provider and profile-store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Email/password pair was not accepted.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The provider refused the request (e.g. sign-up for an existing email).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The operation needs an active session and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// The HTTP request could not be completed.
    #[error("network error: {0}")]
    Network(String),

    /// The provider returned a non-success status not covered above.
    #[error("provider error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    /// Whether the failure is about connectivity rather than the request itself.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api { status: 500..=599, .. })
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Session change pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Identity),
    SignedOut,
}

impl AuthChange {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// External authentication service owning the live session.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity of the currently active session, if any.
    async fn current_session(&self) -> Result<Option<Identity>, AuthError>;

    /// Subscribe to session changes. Events fire until the receiver is dropped.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Create an account. Returns the identity when the provider signs it in
    /// immediately, `None` when confirmation is still pending.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Identity>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// External data service holding per-identity profile rows.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Role stored on the profile keyed by `identity_id`. `None` when the row
    /// is missing or its role is null.
    async fn role_for(&self, identity_id: &str) -> Result<Option<String>, AuthError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
