use tessera::{common::kind::TokenKind, FlowError, TokenError};

use crate::support::Fixture;

#[test_log::test(tokio::test)]
async fn reset_revokes_all_tokens_and_alerts() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let laptop = fixture.login(&user).await;
    let phone = fixture.login(&user).await;

    fixture
        .services
        .flows()
        .reset_password(user.id, "$argon2id$new".to_string())
        .await
        .unwrap();

    for tokens in [&laptop, &phone] {
        assert!(matches!(
            fixture.services.access().validate(&tokens.access.value).await,
            Err(TokenError::Expired(TokenKind::Access))
        ));
    }

    let stored = fixture.reload(&user).await;
    assert!(stored.sessions.is_empty());
    assert_eq!(Some("$argon2id$new"), stored.password_hash.as_deref());

    let sent = fixture.mail.sent();
    assert_eq!(1, sent.len());
    assert_eq!("ada@example.com", sent[0].to);
}

#[test_log::test(tokio::test)]
async fn failed_alert_does_not_roll_back() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;
    fixture.mail.fail();

    let err = fixture
        .services
        .flows()
        .reset_password(user.id, "$argon2id$new".to_string())
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::PostCommitSideEffect(_)));
    assert!(err.status().is_success());

    let stored = fixture.reload(&user).await;
    assert_eq!(Some("$argon2id$new"), stored.password_hash.as_deref());
    assert!(stored.sessions.is_empty());
    assert!(fixture
        .services
        .access()
        .validate(&tokens.access.value)
        .await
        .is_err());
}

#[test_log::test(tokio::test)]
async fn unknown_user() {
    let fixture = Fixture::new();

    assert!(matches!(
        fixture
            .services
            .flows()
            .reset_password(tessera::common::id::UserId::random(), "x".to_string())
            .await,
        Err(FlowError::UserNotFound)
    ));
}
