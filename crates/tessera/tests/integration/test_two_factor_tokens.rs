use secrecy::ExposeSecret;
use tessera::common::{id::SessionId, kind::TokenKind};

use crate::support::Fixture;

#[test_log::test(tokio::test)]
async fn pending_login_token_keeps_its_session() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let service = fixture.services.two_factor_authentication();
    let session_id = SessionId::random();

    let created = service.create(user.id, Some(session_id)).unwrap();
    assert_eq!(Some(session_id), created.session_id);
    assert_eq!(
        fixture.now() + fixture.services.config().two_factor_authentication.ttl(),
        created.expires_at
    );

    assert_eq!(created, service.validate(&created.value).unwrap());
    assert_eq!(
        created,
        service
            .extract(&fixture.request(&[(TokenKind::TwoFactorAuthentication, &created.value)]))
            .unwrap()
    );

    let without_session = service.create(user.id, None).unwrap();
    assert_eq!(without_session, service.validate(&without_session.value).unwrap());
    assert_ne!(created.token_id, without_session.token_id);
}

#[test_log::test(tokio::test)]
async fn provider_connection_roundtrip() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;
    let service = fixture.services.oauth2_provider_connection();

    let created = service
        .create(user.id, tokens.access.session_id, "google")
        .unwrap();

    let (validated, owner) = service.validate(&created.value).await.unwrap();
    assert_eq!(created, validated);
    assert_eq!(user.id, owner.id);

    let (extracted, _) = service
        .extract(&fixture.request(&[(TokenKind::OAuth2ProviderConnection, &created.value)]))
        .await
        .unwrap();
    assert_eq!(created, extracted);
}

#[test_log::test(tokio::test)]
async fn state_roundtrip_keeps_every_field() {
    let fixture = Fixture::new();
    let service = fixture.services.oauth2_state();

    let created = service
        .create(Some("https://app.example.com/".to_string()), true)
        .unwrap();
    assert_eq!(created, service.validate(&created.value).unwrap());
}

#[test_log::test(tokio::test)]
async fn totp_setup_roundtrip() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let service = fixture.services.totp_setup();

    let created = service.create(&user).unwrap().token;
    let validated = service.validate(&created.value, user.id).unwrap();
    let extracted = service
        .extract(
            &fixture.request(&[(TokenKind::TotpSetup, &created.value)]),
            user.id,
        )
        .unwrap();

    for token in [&validated, &extracted] {
        assert_eq!(created.user_id, token.user_id);
        assert_eq!(
            created.secret.expose_secret(),
            token.secret.expose_secret()
        );
        assert_eq!(created.recovery_codes, token.recovery_codes);
        assert_eq!(created.expires_at, token.expires_at);
        assert_eq!(created.value, token.value);
    }
}
