use super::*;
use crate::config::HttpTimeouts;

fn test_client() -> SupabaseClient {
    // Port 9 (discard) is never served locally, so any real request fails fast.
    let mut config = SupabaseConfig::new("http://127.0.0.1:9", "anon").unwrap();
    config.timeouts = HttpTimeouts { request_secs: 2, connect_secs: 1 };
    SupabaseClient::new(config).unwrap()
}

fn session_for(id: &str) -> Session {
    Session {
        access_token: format!("token-{id}"),
        refresh_token: None,
        expires_in: Some(3600),
        identity: Identity::new(id, None),
    }
}

// =============================================================================
// parse_session / parse_identity
// =============================================================================

#[test]
fn parse_session_password_grant_response() {
    let body = r#"{
        "access_token": "at",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "rt",
        "user": {"id": "u1", "email": "a@example.com", "role": "authenticated"}
    }"#;
    let session = parse_session(body).unwrap();
    assert_eq!(session.access_token, "at");
    assert_eq!(session.identity, Identity::new("u1", Some("a@example.com".into())));
}

#[test]
fn parse_session_missing_user_is_parse_error() {
    let err = parse_session(r#"{"access_token":"at"}"#).unwrap_err();
    assert!(matches!(err, AuthError::Parse(_)));
}

#[test]
fn parse_identity_user_response() {
    let identity = parse_identity(r#"{"id":"u9","email":null}"#).unwrap();
    assert_eq!(identity.id, "u9");
    assert!(identity.email.is_none());
}

#[test]
fn parse_identity_garbage() {
    assert!(matches!(parse_identity("<html>"), Err(AuthError::Parse(_))));
}

// =============================================================================
// parse_sign_up
// =============================================================================

#[test]
fn parse_sign_up_autoconfirmed_returns_session() {
    let body = r#"{"access_token":"at","user":{"id":"u1","email":"a@example.com"}}"#;
    match parse_sign_up(body).unwrap() {
        SignUpOutcome::SignedIn(session) => assert_eq!(session.identity.id, "u1"),
        SignUpOutcome::PendingConfirmation(_) => panic!("expected session"),
    }
}

#[test]
fn parse_sign_up_bare_user_is_pending() {
    let body = r#"{"id":"u2","email":"b@example.com","confirmation_sent_at":"2024-01-01T00:00:00Z"}"#;
    assert_eq!(
        parse_sign_up(body).unwrap(),
        SignUpOutcome::PendingConfirmation(Identity::new("u2", Some("b@example.com".into())))
    );
}

#[test]
fn parse_sign_up_wrapped_user_is_pending() {
    let body = r#"{"user":{"id":"u3"},"session":null}"#;
    assert_eq!(parse_sign_up(body).unwrap(), SignUpOutcome::PendingConfirmation(Identity::new("u3", None)));
}

// =============================================================================
// parse_role_rows
// =============================================================================

#[test]
fn parse_role_rows_first_row() {
    assert_eq!(parse_role_rows(r#"[{"role":"admin"}]"#, "role").unwrap(), Some("admin".into()));
}

#[test]
fn parse_role_rows_empty_is_none() {
    assert_eq!(parse_role_rows("[]", "role").unwrap(), None);
}

#[test]
fn parse_role_rows_null_role_is_none() {
    assert_eq!(parse_role_rows(r#"[{"role":null}]"#, "role").unwrap(), None);
}

#[test]
fn parse_role_rows_custom_column() {
    assert_eq!(parse_role_rows(r#"[{"kind":"moderator"}]"#, "kind").unwrap(), Some("moderator".into()));
    assert_eq!(parse_role_rows(r#"[{"kind":"moderator"}]"#, "role").unwrap(), None);
}

#[test]
fn parse_role_rows_object_body_is_error() {
    assert!(matches!(parse_role_rows(r#"{"message":"oops"}"#, "role"), Err(AuthError::Parse(_))));
}

// =============================================================================
// classify_error
// =============================================================================

#[test]
fn classify_invalid_grant_legacy_body() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    assert_eq!(classify_error(400, body), AuthError::InvalidCredentials);
}

#[test]
fn classify_invalid_credentials_error_code() {
    let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
    assert_eq!(classify_error(400, body), AuthError::InvalidCredentials);
}

#[test]
fn classify_weak_password_is_rejected() {
    let body = r#"{"code":422,"error_code":"weak_password","msg":"Password should be at least 6 characters."}"#;
    assert_eq!(classify_error(422, body), AuthError::Rejected("Password should be at least 6 characters.".into()));
}

#[test]
fn classify_other_400_with_code_is_rejected() {
    let body = r#"{"error_code":"email_address_invalid","msg":"Email address is invalid"}"#;
    assert!(matches!(classify_error(400, body), AuthError::Rejected(_)));
}

#[test]
fn classify_server_error_keeps_status() {
    let err = classify_error(503, "upstream unavailable");
    assert_eq!(err, AuthError::Api { status: 503, message: "upstream unavailable".into() });
    assert!(err.is_connectivity());
}

#[test]
fn classify_postgrest_message() {
    let body = r#"{"code":"42P01","message":"relation \"public.profiles\" does not exist"}"#;
    match classify_error(404, body) {
        AuthError::Api { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("profiles"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// =============================================================================
// session bookkeeping
// =============================================================================

#[tokio::test]
async fn install_session_broadcasts_signed_in() {
    let client = test_client();
    let mut rx = client.subscribe();
    client.install_session(session_for("u1")).await;

    assert_eq!(rx.recv().await.unwrap(), AuthChange::SignedIn(Identity::new("u1", None)));
    assert_eq!(client.access_token().await.as_deref(), Some("token-u1"));
}

#[tokio::test]
async fn clear_session_broadcasts_signed_out_once() {
    let client = test_client();
    client.install_session(session_for("u1")).await;
    let mut rx = client.subscribe();

    client.clear_session().await;
    client.clear_session().await;

    assert_eq!(rx.recv().await.unwrap(), AuthChange::SignedOut);
    assert!(rx.try_recv().is_err());
    assert!(client.access_token().await.is_none());
}

#[tokio::test]
async fn current_session_without_session_skips_network() {
    let client = test_client();
    assert_eq!(client.current_session().await.unwrap(), None);
}

#[tokio::test]
async fn sign_out_without_session_is_ok() {
    let client = test_client();
    client.sign_out().await.unwrap();
}

#[tokio::test]
async fn sign_in_unreachable_host_is_network_error() {
    let client = test_client();
    let err = client
        .sign_in_with_password("a@example.com", "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
    assert!(client.access_token().await.is_none());
}
