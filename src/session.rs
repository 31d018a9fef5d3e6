//! Session store — who is signed in, and with what role.
//!
//! ARCHITECTURE
//! ============
//! `SessionStore` is an explicit context object: create it once with the
//! provider and profile store, call `initialize` from any entry point, and
//! hand out `watch` receivers to consumers. State is a single
//! `watch` channel so every read is a consistent snapshot and every change
//! wakes dependents.
//!
//! Identity changes arrive only through the provider's `AuthChange` stream
//! (plus the initial query and `logout`). `login` and `register` never write
//! state themselves, so there is one write path per transition.
//!
//! CONCURRENCY
//! ===========
//! Each identity transition bumps `generation`. A role lookup remembers the
//! generation it started under and its result is applied only if that
//! generation is still current, so a slow lookup for a superseded identity
//! is discarded. The compare-and-apply happens inside `send_if_modified`,
//! which holds the channel's write lock.
//!
//! The standing subscription is a spawned listener task. Role lookups it
//! starts live in a `JoinSet` owned by that task; `teardown` (or dropping the
//! store) aborts the listener and with it every in-flight lookup.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{OnceCell, SetError, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::identity::{Identity, Role};
use crate::provider::{AuthChange, AuthError, IdentityProvider, ProfileStore};

// =============================================================================
// STATE
// =============================================================================

/// Snapshot of the store. Cloned out of the watch channel on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub role: Role,
    /// Set once the first reconciliation with the provider has finished.
    pub initialized: bool,
    /// False while a role lookup for the current identity is in flight.
    pub settled: bool,
    /// Bumped on every identity transition.
    pub generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { identity: None, role: Role::default(), initialized: false, settled: true, generation: 0 }
    }
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Pending role lookup produced by an identity transition.
struct RoleLookup {
    generation: u64,
    identity_id: String,
}

// =============================================================================
// SHARED CORE
// =============================================================================

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    state: watch::Sender<SessionState>,
}

impl Shared {
    /// Record a new identity (or its absence). Returns the role lookup to run,
    /// if any.
    fn apply_identity(&self, identity: Option<Identity>) -> Option<RoleLookup> {
        let mut lookup = None;
        self.state.send_if_modified(|state| {
            let Some(identity) = identity else {
                if state.identity.is_none() && state.role.is_default() {
                    return false;
                }
                state.generation += 1;
                state.identity = None;
                state.role = Role::default();
                state.settled = true;
                info!(generation = state.generation, "session signed out");
                return true;
            };

            let same_principal = state.identity.as_ref().is_some_and(|current| current.id == identity.id);
            state.generation += 1;
            if !same_principal {
                state.role = Role::default();
            }
            info!(identity_id = %identity.id, generation = state.generation, "session signed in");
            lookup = Some(RoleLookup { generation: state.generation, identity_id: identity.id.clone() });
            state.identity = Some(identity);
            state.settled = false;
            true
        });
        lookup
    }

    /// Apply a resolved role if no newer transition happened meanwhile.
    fn apply_role(&self, generation: u64, role: Role) {
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                debug!(generation, current = state.generation, "discarding stale role lookup");
                return false;
            }
            debug!(generation, role = %role, "role resolved");
            let changed = state.role != role || !state.settled;
            state.role = role;
            state.settled = true;
            changed
        });
    }

    async fn resolve_role(&self, identity_id: &str) -> Role {
        match self.profiles.role_for(identity_id).await {
            Ok(role) => Role::from(role),
            Err(e) => {
                warn!(identity_id, error = %e, "role lookup failed; using default role");
                Role::default()
            }
        }
    }

    async fn run_lookup(&self, lookup: RoleLookup) {
        let role = self.resolve_role(&lookup.identity_id).await;
        self.apply_role(lookup.generation, role);
    }

    async fn reconcile(&self, identity: Option<Identity>) {
        if let Some(lookup) = self.apply_identity(identity) {
            self.run_lookup(lookup).await;
        }
    }
}

/// Standing listener: applies each change immediately and resolves roles in
/// the background so a slow lookup never delays the next transition.
async fn listen(shared: Arc<Shared>, mut changes: broadcast::Receiver<AuthChange>) {
    let mut lookups = JoinSet::new();
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    if let Some(lookup) = shared.apply_identity(change.identity().cloned()) {
                        let shared = Arc::clone(&shared);
                        lookups.spawn(async move { shared.run_lookup(lookup).await });
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session change events dropped; re-querying provider");
                    match shared.provider.current_session().await {
                        Ok(identity) => {
                            if let Some(lookup) = shared.apply_identity(identity) {
                                let shared = Arc::clone(&shared);
                                lookups.spawn(async move { shared.run_lookup(lookup).await });
                            }
                        }
                        Err(e) => warn!(error = %e, "session re-query failed; keeping current state"),
                    }
                }
                Err(RecvError::Closed) => {
                    info!("identity provider closed its change stream");
                    break;
                }
            },
            Some(joined) = lookups.join_next(), if !lookups.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "role lookup task panicked");
                    }
                }
            }
        }
    }
    while lookups.join_next().await.is_some() {}
}

// =============================================================================
// STORE
// =============================================================================

/// Lifecycle of the standing subscription.
enum Listener {
    Idle,
    Running(JoinHandle<()>),
    TornDown,
}

/// Single source of truth for the signed-in identity and its role.
pub struct SessionStore {
    shared: Arc<Shared>,
    init: OnceCell<()>,
    listener: Mutex<Listener>,
}

impl SessionStore {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { shared: Arc::new(Shared { provider, profiles, state }), init: OnceCell::new(), listener: Mutex::new(Listener::Idle) }
    }

    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        self.shared.state.borrow().identity.clone()
    }

    #[must_use]
    pub fn current_role(&self) -> Role {
        self.shared.state.borrow().role.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Reactive view of the state; the receiver is notified on every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.state.borrow().initialized
    }

    /// Reconcile with the provider and start listening for session changes.
    ///
    /// Runs once per store; concurrent and repeated calls wait for (or skip)
    /// the first run. Provider failures are logged and leave the store
    /// signed out; this never fails.
    pub async fn initialize(&self) {
        self.init
            .get_or_init(|| async { self.run_initialize().await })
            .await;
    }

    async fn run_initialize(&self) {
        // Subscribe before querying so a change racing the query is queued.
        let changes = self.shared.provider.subscribe();

        let identity = match self.shared.provider.current_session().await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "initial session query failed; starting signed out");
                None
            }
        };
        self.shared.reconcile(identity).await;
        self.shared.state.send_modify(|state| state.initialized = true);

        {
            let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*listener, Listener::TornDown) {
                // Torn down while reconciling; `changes` is dropped here.
                debug!("session store torn down during initialize; not subscribing");
                return;
            }
            let handle = tokio::spawn(listen(Arc::clone(&self.shared), changes));
            if let Listener::Running(previous) = std::mem::replace(&mut *listener, Listener::Running(handle)) {
                previous.abort();
            }
        }

        let state = self.snapshot();
        info!(
            authenticated = state.is_authenticated(),
            role = %state.role,
            "session store initialized"
        );
    }

    /// Verify credentials with the provider.
    ///
    /// State is updated by the resulting change notification, not here.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged; state is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        match self.shared.provider.sign_in_with_password(email, password).await {
            Ok(identity) => {
                info!(identity_id = %identity.id, "login accepted");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                Err(e)
            }
        }
    }

    /// Create an account with the provider.
    ///
    /// Returns the new identity when the provider signs it in immediately;
    /// as with `login`, state follows from the change notification.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged.
    pub async fn register(&self, email: &str, password: &str) -> Result<Option<Identity>, AuthError> {
        let identity = self.shared.provider.sign_up(email, password).await?;
        match &identity {
            Some(identity) => info!(identity_id = %identity.id, "registered and signed in"),
            None => info!("registered; awaiting confirmation"),
        }
        Ok(identity)
    }

    /// End the session with the provider and clear local state.
    ///
    /// Local state is reset even when the provider call fails.
    ///
    /// # Errors
    ///
    /// Returns the provider's sign-out error after the local reset.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let result = self.shared.provider.sign_out().await;
        self.shared.apply_identity(None);
        if let Err(e) = &result {
            warn!(error = %e, "provider sign-out failed; local session cleared anyway");
        }
        result
    }

    /// Release the provider subscription and abort in-flight role lookups.
    ///
    /// State keeps its last value. A torn-down store does not re-initialize.
    pub fn teardown(&self) {
        let previous = std::mem::replace(
            &mut *self.listener.lock().unwrap_or_else(PoisonError::into_inner),
            Listener::TornDown,
        );
        if let Listener::Running(handle) = previous {
            handle.abort();
            debug!("session store subscription released");
        }

        match self.init.set(()) {
            Ok(()) | Err(SetError::AlreadyInitializedError(())) => {}
            // An in-flight initialize sees `TornDown` before it subscribes.
            Err(SetError::InitializingError(())) => debug!("teardown raced initialize"),
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
