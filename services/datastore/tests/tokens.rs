mod common;

use chrono::Duration;
use datastore::auth::Clock;
use datastore::model::TokenScope;
use datastore::service::{ServiceError, banks, tokens};
use datastore::store::StoreError;

#[tokio::test]
async fn activation_token_scope_and_expiry() {
    let h = common::harness();
    let registration = banks::register_bank(
        &h.state,
        banks::RegisterBank {
            name: "Scope Bank".to_string(),
            email: "scope@example.com".to_string(),
            password: "long enough password".to_string(),
        },
    )
    .await
    .expect("register");
    let issued = h
        .state
        .tokens
        .generate(
            h.store.as_ref(),
            registration.bank.id,
            Duration::hours(1),
            TokenScope::Activation,
        )
        .await
        .expect("token");

    let bank = h
        .state
        .tokens
        .resolve(h.store.as_ref(), TokenScope::Activation, &issued.plaintext)
        .await
        .expect("resolves for activation");
    assert_eq!(bank.id, registration.bank.id);

    let err = h
        .state
        .tokens
        .resolve(h.store.as_ref(), TokenScope::Authentication, &issued.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    h.clock.advance(Duration::hours(1));
    let err = h
        .state
        .tokens
        .resolve(h.store.as_ref(), TokenScope::Activation, &issued.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn activation_is_single_use() {
    let h = common::harness();
    let registration = banks::register_bank(
        &h.state,
        banks::RegisterBank {
            name: "Once Bank".to_string(),
            email: "once@example.com".to_string(),
            password: "long enough password".to_string(),
        },
    )
    .await
    .expect("register");
    assert_eq!(registration.activation_token.scope, TokenScope::Activation);
    assert_eq!(
        registration.activation_token.expiry,
        h.clock.now() + Duration::days(3)
    );

    let bank = banks::activate_bank(&h.state, &registration.activation_token.plaintext)
        .await
        .expect("activate");
    assert!(bank.activated);
    assert_eq!(bank.version, 2);

    let err = banks::activate_bank(&h.state, &registration.activation_token.plaintext)
        .await
        .unwrap_err();
    let fields = err.validation_errors().expect("validation");
    assert_eq!(fields.get("token"), Some("invalid or expired activation token"));
}

#[tokio::test]
async fn login_with_wrong_password_or_unknown_email_is_indistinguishable() {
    let h = common::harness();
    common::activated_bank(&h.state, "login@example.com").await;

    let wrong =
        tokens::create_authentication_token(&h.state, "login@example.com", "not the password")
            .await
            .unwrap_err();
    let unknown = tokens::create_authentication_token(
        &h.state,
        "nobody@example.com",
        "correct horse battery",
    )
    .await
    .unwrap_err();
    assert!(matches!(wrong, ServiceError::InvalidCredentials));
    assert!(matches!(unknown, ServiceError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn authentication_tokens_last_a_day() {
    let h = common::harness();
    let (_, caller) = common::activated_bank(&h.state, "daily@example.com").await;
    assert!(!caller.is_anonymous());

    let token = tokens::create_authentication_token(
        &h.state,
        "daily@example.com",
        "correct horse battery",
    )
    .await
    .expect("login");
    let header = format!("Bearer {}", token.plaintext);

    h.clock.advance(Duration::hours(23));
    tokens::authenticate(&h.state, Some(&header))
        .await
        .expect("still valid");

    h.clock.advance(Duration::hours(1));
    let err = tokens::authenticate(&h.state, Some(&header)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidAuthenticationToken));
}

#[tokio::test]
async fn password_reset_flow() {
    let h = common::harness();
    common::activated_bank(&h.state, "reset@example.com").await;

    let reset = tokens::create_password_reset_token(&h.state, "reset@example.com")
        .await
        .expect("reset token");
    assert_eq!(reset.scope, TokenScope::PasswordReset);

    let bank = tokens::reset_bank_password(&h.state, &reset.plaintext, "a brand new secret")
        .await
        .expect("reset");
    assert!(bank.activated);

    tokens::create_authentication_token(&h.state, "reset@example.com", "a brand new secret")
        .await
        .expect("new password works");
    let err =
        tokens::create_authentication_token(&h.state, "reset@example.com", "correct horse battery")
            .await
            .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));

    let err = tokens::reset_bank_password(&h.state, &reset.plaintext, "yet another secret")
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors().and_then(|v| v.get("token")),
        Some("invalid or expired password reset token")
    );
}

#[tokio::test]
async fn password_reset_requires_activation() {
    let h = common::harness();
    banks::register_bank(
        &h.state,
        banks::RegisterBank {
            name: "Dormant Bank".to_string(),
            email: "dormant@example.com".to_string(),
            password: "long enough password".to_string(),
        },
    )
    .await
    .expect("register");
    let err = tokens::create_password_reset_token(&h.state, "dormant@example.com")
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors().and_then(|v| v.get("email")),
        Some("bank account must be activated")
    );
}

#[tokio::test]
async fn expired_activation_can_be_reissued() {
    let h = common::harness();
    let registration = banks::register_bank(
        &h.state,
        banks::RegisterBank {
            name: "Late Bank".to_string(),
            email: "late@example.com".to_string(),
            password: "long enough password".to_string(),
        },
    )
    .await
    .expect("register");

    h.clock.advance(Duration::days(3) + Duration::hours(1));
    let err = banks::activate_bank(&h.state, &registration.activation_token.plaintext)
        .await
        .unwrap_err();
    assert!(err.validation_errors().is_some());

    let reissued = tokens::create_activation_token(&h.state, "LATE@example.com")
        .await
        .expect("reissue");
    assert_eq!(reissued.scope, TokenScope::Activation);
    assert_eq!(reissued.expiry, h.clock.now() + Duration::days(3));

    let bank = banks::activate_bank(&h.state, &reissued.plaintext)
        .await
        .expect("activate");
    assert!(bank.activated);

    let err = tokens::create_activation_token(&h.state, "late@example.com")
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors().and_then(|v| v.get("email")),
        Some("bank has already been activated")
    );
    let err = tokens::create_activation_token(&h.state, "nobody@example.com")
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors().and_then(|v| v.get("email")),
        Some("no matching email address found")
    );
}
