//! Supabase GoTrue + PostgREST client.
//!
//! Thin HTTP wrapper for `/auth/v1/*` and the profile table under
//! `/rest/v1/*`. Response parsing and error classification are pure
//! functions so they can be tested without a network.
//!
//! SESSION
//! =======
//! The current session is held in memory only. Every change to it is
//! broadcast as an `AuthChange` so subscribers see sign-in, sign-out and
//! server-side expiry the same way.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use super::{AuthChange, AuthError, IdentityProvider, ProfileStore};
use crate::config::SupabaseConfig;
use crate::identity::{Identity, Session};

const EVENT_CHANNEL_CAPACITY: usize = 32;
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl SupabaseClient {
    /// Build a client from typed config.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: SupabaseConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self { http, config, session: RwLock::new(None), events })
    }

    #[must_use]
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Current access token, if a session is held.
    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Adopt an access token obtained elsewhere (e.g. a previous CLI run).
    ///
    /// The token is validated against `/auth/v1/user` before it is stored.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotSignedIn`] if the token is rejected, or the
    /// underlying request error.
    pub async fn restore_session(&self, access_token: &str) -> Result<Identity, AuthError> {
        let request = self.http.get(self.config.auth_url("user")).bearer_auth(access_token);
        let (status, body) = self.send(request).await?;
        match status {
            200..=299 => {
                let identity = parse_identity(&body)?;
                self.install_session(Session {
                    access_token: access_token.to_owned(),
                    refresh_token: None,
                    expires_in: None,
                    identity: identity.clone(),
                })
                .await;
                Ok(identity)
            }
            401 | 403 => Err(AuthError::NotSignedIn),
            _ => Err(classify_error(status, &body)),
        }
    }

    pub(crate) async fn install_session(&self, session: Session) {
        let identity = session.identity.clone();
        *self.session.write().await = Some(session);
        info!(identity_id = %identity.id, "supabase session established");
        let _ = self.events.send(AuthChange::SignedIn(identity));
    }

    pub(crate) async fn clear_session(&self) {
        let previous = self.session.write().await.take();
        if let Some(previous) = previous {
            info!(identity_id = %previous.identity.id, "supabase session cleared");
            let _ = self.events.send(AuthChange::SignedOut);
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), AuthError> {
        let response = request
            .header("apikey", &self.config.anon_key)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok((status, text))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Identity>, AuthError> {
        let Some(token) = self.access_token().await else {
            return Ok(None);
        };

        let request = self.http.get(self.config.auth_url("user")).bearer_auth(&token);
        let (status, body) = self.send(request).await?;
        match status {
            200..=299 => {
                let identity = parse_identity(&body)?;
                if let Some(session) = self.session.write().await.as_mut() {
                    session.identity = identity.clone();
                }
                Ok(Some(identity))
            }
            401 | 403 => {
                debug!(status, "stored session rejected by provider");
                self.clear_session().await;
                Ok(None)
            }
            _ => Err(classify_error(status, &body)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let request = self
            .http
            .post(self.config.auth_url("token?grant_type=password"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let (status, body) = self.send(request).await?;
        if !(200..300).contains(&status) {
            return Err(classify_error(status, &body));
        }

        let session = parse_session(&body)?;
        let identity = session.identity.clone();
        self.install_session(session).await;
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Identity>, AuthError> {
        let request = self
            .http
            .post(self.config.auth_url("signup"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let (status, body) = self.send(request).await?;
        if !(200..300).contains(&status) {
            return Err(classify_error(status, &body));
        }

        match parse_sign_up(&body)? {
            SignUpOutcome::SignedIn(session) => {
                let identity = session.identity.clone();
                self.install_session(session).await;
                Ok(Some(identity))
            }
            SignUpOutcome::PendingConfirmation(identity) => {
                info!(identity_id = %identity.id, "sign-up pending email confirmation");
                Ok(None)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(token) = self.access_token().await else {
            return Ok(());
        };

        let request = self.http.post(self.config.auth_url("logout")).bearer_auth(&token);
        let (status, body) = self.send(request).await?;
        match status {
            200..=299 | 401 | 404 => {
                self.clear_session().await;
                Ok(())
            }
            _ => Err(classify_error(status, &body)),
        }
    }
}

#[async_trait::async_trait]
impl ProfileStore for SupabaseClient {
    async fn role_for(&self, identity_id: &str) -> Result<Option<String>, AuthError> {
        let bearer = self
            .access_token()
            .await
            .unwrap_or_else(|| self.config.anon_key.clone());
        let request = self
            .http
            .get(self.config.rest_url(&self.config.profiles_table))
            .query(&[("select", self.config.role_column.clone()), ("id", format!("eq.{identity_id}"))])
            .bearer_auth(bearer);
        let (status, body) = self.send(request).await?;
        if !(200..300).contains(&status) {
            return Err(classify_error(status, &body));
        }
        parse_role_rows(&body, &self.config.role_column)
    }
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SignUpOutcome {
    /// Auto-confirmed account; the provider returned a live session.
    SignedIn(Session),
    /// Account created, email confirmation pending.
    PendingConfirmation(Identity),
}

pub(crate) fn parse_session(body: &str) -> Result<Session, AuthError> {
    serde_json::from_str(body).map_err(|e| AuthError::Parse(format!("session: {e}")))
}

pub(crate) fn parse_identity(body: &str) -> Result<Identity, AuthError> {
    serde_json::from_str(body).map_err(|e| AuthError::Parse(format!("user: {e}")))
}

pub(crate) fn parse_sign_up(body: &str) -> Result<SignUpOutcome, AuthError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AuthError::Parse(format!("sign-up: {e}")))?;
    if value.get("access_token").is_some() {
        let session = serde_json::from_value(value).map_err(|e| AuthError::Parse(format!("sign-up session: {e}")))?;
        return Ok(SignUpOutcome::SignedIn(session));
    }
    // Unconfirmed sign-ups return the bare user, or `{ "user": ... }` on newer servers.
    let user = value.get("user").cloned().unwrap_or(value);
    let identity = serde_json::from_value(user).map_err(|e| AuthError::Parse(format!("sign-up user: {e}")))?;
    Ok(SignUpOutcome::PendingConfirmation(identity))
}

/// Read `column` from the first PostgREST row. Missing rows and null or
/// non-string values yield `None`.
pub(crate) fn parse_role_rows(body: &str, column: &str) -> Result<Option<String>, AuthError> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| AuthError::Parse(format!("profile rows: {e}")))?;
    Ok(rows
        .first()
        .and_then(|row| row.get(column))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned))
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

/// Map a non-success GoTrue/PostgREST response onto [`AuthError`].
pub(crate) fn classify_error(status: u16, body: &str) -> AuthError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let credential_failure = parsed.error_code.as_deref() == Some("invalid_credentials")
        || parsed.error.as_deref() == Some("invalid_grant");

    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect());

    match status {
        400 if credential_failure => AuthError::InvalidCredentials,
        422 => AuthError::Rejected(message),
        400 if parsed.error_code.is_some() => AuthError::Rejected(message),
        _ => AuthError::Api { status, message },
    }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
