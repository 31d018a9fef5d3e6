use std::sync::Arc;
use std::time::Duration;

use catalog_auth::config::{ConfigError, SupabaseConfig};
use catalog_auth::guard::{Navigation, RouteTable};
use catalog_auth::provider::{AuthError, IdentityProvider, ProfileStore};
use catalog_auth::provider::supabase::SupabaseClient;
use catalog_auth::{SessionState, SessionStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const SETTLE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("timed out waiting for the session to settle")]
    Timeout,
    #[error("session store closed")]
    StoreClosed,
}

#[derive(Parser, Debug)]
#[command(name = "catalog-auth", about = "Game catalog session CLI")]
struct Cli {
    /// Reuse an access token printed by a previous `login`.
    #[arg(long, env = "SUPABASE_ACCESS_TOKEN")]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current identity and role.
    Whoami,
    Login {
        email: String,
        #[arg(long, env = "CATALOG_PASSWORD")]
        password: String,
    },
    Register {
        email: String,
        #[arg(long, env = "CATALOG_PASSWORD")]
        password: String,
    },
    Logout,
    /// Run the route guard for a path against the current session.
    Navigate { path: String },
    /// Print every session change until interrupted.
    Watch,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = Arc::new(SupabaseClient::new(SupabaseConfig::from_env()?)?);
    if let Some(token) = &cli.access_token {
        if let Err(e) = client.restore_session(token).await {
            tracing::warn!(error = %e, "stored access token not accepted; continuing signed out");
        }
    }

    let store = build_store(&client);
    store.initialize().await;

    let result = dispatch(&cli.command, &store, &client).await;
    store.teardown();
    result
}

/// The Supabase client serves as both the identity provider and the profile store.
fn build_store(client: &Arc<SupabaseClient>) -> SessionStore {
    let provider: Arc<dyn IdentityProvider> = Arc::clone(client) as Arc<dyn IdentityProvider>;
    let profiles: Arc<dyn ProfileStore> = Arc::clone(client) as Arc<dyn ProfileStore>;
    SessionStore::new(provider, profiles)
}

async fn dispatch(command: &Command, store: &SessionStore, client: &SupabaseClient) -> Result<(), CliError> {
    match command {
        Command::Whoami => print_state(&store.snapshot()),
        Command::Login { email, password } => {
            store.login(email, password).await?;
            let state = settle(store, |s| s.is_authenticated() && s.settled).await?;
            print_state(&state);
            if let Some(token) = client.access_token().await {
                println!("access_token: {token}");
            }
        }
        Command::Register { email, password } => {
            if store.register(email, password).await?.is_some() {
                let state = settle(store, |s| s.is_authenticated() && s.settled).await?;
                print_state(&state);
            } else {
                println!("account created for {email}; confirm the email before signing in");
            }
        }
        Command::Logout => {
            store.logout().await?;
            print_state(&store.snapshot());
        }
        Command::Navigate { path } => match RouteTable::default().navigate(path, &store.snapshot()) {
            Navigation::Proceed => println!("proceed {path}"),
            Navigation::Redirect { to } => println!("redirect {to}"),
        },
        Command::Watch => {
            let mut rx = store.watch();
            print_state(&rx.borrow_and_update());
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        print_state(&rx.borrow_and_update());
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}

async fn settle(store: &SessionStore, pred: impl FnMut(&SessionState) -> bool) -> Result<SessionState, CliError> {
    let mut rx = store.watch();
    let state = tokio::time::timeout(Duration::from_secs(SETTLE_TIMEOUT_SECS), rx.wait_for(pred))
        .await
        .map_err(|_| CliError::Timeout)?
        .map_err(|_| CliError::StoreClosed)?;
    Ok(state.clone())
}

fn print_state(state: &SessionState) {
    match &state.identity {
        Some(identity) => println!(
            "signed in: {} <{}> role={}",
            identity.id,
            identity.email.as_deref().unwrap_or("-"),
            state.role
        ),
        None => println!("signed out role={}", state.role),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
