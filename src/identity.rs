//! Identity, session, and role types shared by the store and providers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role assigned whenever no profile role applies.
pub const DEFAULT_ROLE: &str = "user";

// =============================================================================
// IDENTITY
// =============================================================================

/// The signed-in principal as reported by the identity provider.
///
/// Only the fields the catalog consumes are kept; the provider record carries
/// more, which serde ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued unique id. Also the primary key of the profile row.
    pub id: String,
    /// Sign-in email, if the provider exposes one.
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self { id: id.into(), email }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Live proof of authentication held by a provider implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(rename = "user")]
    pub identity: Identity,
}

// =============================================================================
// ROLE
// =============================================================================

/// Single authorization classifier read from the identity's profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Build a role, falling back to [`DEFAULT_ROLE`] for blank input.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self(trimmed.to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_ROLE
    }
}

impl Default for Role {
    fn default() -> Self {
        Self(DEFAULT_ROLE.to_owned())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<Option<String>> for Role {
    fn from(raw: Option<String>) -> Self {
        raw.map_or_else(Self::default, Self::new)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
