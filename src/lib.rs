//! # catalog-auth
//!
//! Client-side session core for the game catalog: keeps the signed-in
//! identity and its profile role in sync with Supabase, and guards routes
//! that need a signed-in user.
//!
//! The `SessionStore` depends only on the `IdentityProvider` and
//! `ProfileStore` traits; `provider::supabase` is the production
//! implementation of both.

pub mod config;
pub mod guard;
pub mod identity;
pub mod provider;
pub mod session;

pub use identity::{DEFAULT_ROLE, Identity, Role};
pub use session::{SessionState, SessionStore};
