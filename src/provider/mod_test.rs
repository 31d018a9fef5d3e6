use super::*;

#[test]
fn signed_in_carries_identity() {
    let change = AuthChange::SignedIn(Identity::new("u1", None));
    assert_eq!(change.identity().map(|i| i.id.as_str()), Some("u1"));
}

#[test]
fn signed_out_has_no_identity() {
    assert!(AuthChange::SignedOut.identity().is_none());
}

#[test]
fn connectivity_errors() {
    assert!(AuthError::Network("reset".into()).is_connectivity());
    assert!(AuthError::Api { status: 502, message: String::new() }.is_connectivity());
    assert!(!AuthError::Api { status: 404, message: String::new() }.is_connectivity());
    assert!(!AuthError::InvalidCredentials.is_connectivity());
}

#[test]
fn error_messages() {
    assert_eq!(AuthError::InvalidCredentials.to_string(), "invalid login credentials");
    assert_eq!(
        AuthError::Api { status: 500, message: "boom".into() }.to_string(),
        "provider error: status 500: boom"
    );
}
