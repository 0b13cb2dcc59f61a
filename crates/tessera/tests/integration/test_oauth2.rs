use tessera::{
    common::kind::TokenKind,
    flow::StepUpProof,
    store::UserStore,
    AuthError, FlowError, TokenError,
};

use crate::support::Fixture;

#[test_log::test]
fn state_roundtrip() {
    let fixture = Fixture::new();
    let states = fixture.services.oauth2_state();

    let state = states
        .create(Some("https://app.example.com/settings".to_string()), true)
        .unwrap();
    assert_eq!(64, state.state.len());

    let request = fixture.request(&[(TokenKind::OAuth2State, &state.value)]);
    let checked = states.check(&request, &state.state).unwrap();
    assert_eq!(
        Some("https://app.example.com/settings"),
        checked.redirect_uri.as_deref()
    );
    assert!(checked.step_up);

    assert!(matches!(
        states.check(&request, "forged"),
        Err(TokenError::Invalid(TokenKind::OAuth2State, "state mismatch"))
    ));
}

#[test_log::test]
fn empty_redirect_uri_is_none() {
    let fixture = Fixture::new();
    let states = fixture.services.oauth2_state();

    let state = states.create(Some(String::new()), false).unwrap();
    assert_eq!(None, state.redirect_uri);
    assert_eq!(None, states.validate(&state.value).unwrap().redirect_uri);
}

#[test_log::test]
fn state_is_fresh_and_expires() {
    let fixture = Fixture::new();
    let states = fixture.services.oauth2_state();

    let first = states.create(None, false).unwrap();
    let second = states.create(None, false).unwrap();
    assert_ne!(first.state, second.state);

    fixture
        .clock
        .advance(fixture.services.config().oauth2_state.ttl());
    assert!(matches!(
        states.validate(&first.value),
        Err(TokenError::Expired(TokenKind::OAuth2State))
    ));
}

#[test_log::test(tokio::test)]
async fn link_provider() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;
    let flows = fixture.services.flows();

    let connection = flows
        .begin_oauth2_connection(&fixture.ctx_for(&tokens).await, "github")
        .unwrap();
    assert_eq!(user.id, connection.user_id);
    assert_eq!(tokens.access.session_id, connection.session_id);

    let callback = fixture.request(&[(TokenKind::OAuth2ProviderConnection, &connection.value)]);
    let linked = flows
        .complete_oauth2_connection(&callback, "gh-1234")
        .await
        .unwrap();
    let provider = linked.identity_provider("github").unwrap();
    assert_eq!("gh-1234", provider.subject);
    assert_eq!(fixture.now(), provider.linked_at);

    assert!(matches!(
        flows.complete_oauth2_connection(&callback, "gh-5678").await,
        Err(FlowError::Conflict(_))
    ));
    assert_eq!(
        "gh-1234",
        fixture
            .reload(&user)
            .await
            .identity_provider("github")
            .unwrap()
            .subject
    );
}

#[test_log::test(tokio::test)]
async fn connection_dies_with_its_session() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;
    let ctx = fixture.ctx_for(&tokens).await;
    let flows = fixture.services.flows();

    let connection = flows.begin_oauth2_connection(&ctx, "github").unwrap();
    flows.logout(&ctx).await.unwrap();

    assert!(matches!(
        flows
            .complete_oauth2_connection(
                &fixture.request(&[(TokenKind::OAuth2ProviderConnection, &connection.value)]),
                "gh-1234"
            )
            .await,
        Err(FlowError::Token(TokenError::Invalid(
            TokenKind::OAuth2ProviderConnection,
            "session no longer exists"
        )))
    ));
    assert!(fixture.reload(&user).await.identity_providers.is_empty());
}

#[test_log::test(tokio::test)]
async fn connection_requires_sign_in() {
    let fixture = Fixture::new();

    assert!(matches!(
        fixture
            .services
            .flows()
            .begin_oauth2_connection(&fixture.ctx(&[]).await, "github"),
        Err(FlowError::Auth(AuthError::AuthenticationRequired))
    ));
}

#[test_log::test(tokio::test)]
async fn unlink_provider() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let mut tokens = fixture.login(&user).await;
    let flows = fixture.services.flows();

    for (provider, subject) in [("github", "gh-1"), ("google", "g-1")] {
        let connection = flows
            .begin_oauth2_connection(&fixture.ctx_for(&tokens).await, provider)
            .unwrap();
        flows
            .complete_oauth2_connection(
                &fixture.request(&[(TokenKind::OAuth2ProviderConnection, &connection.value)]),
                subject,
            )
            .await
            .unwrap();
    }

    assert!(matches!(
        flows
            .delete_identity_provider(&fixture.ctx_for(&tokens).await, "github")
            .await,
        Err(FlowError::Auth(AuthError::StepUpRequired(_)))
    ));

    tokens.step_up = Some(
        flows
            .step_up(&fixture.ctx_for(&tokens).await, StepUpProof::PasswordVerified)
            .await
            .unwrap(),
    );
    let ctx = fixture.ctx_for(&tokens).await;

    let updated = flows.delete_identity_provider(&ctx, "github").await.unwrap();
    assert!(updated.identity_provider("github").is_none());
    assert!(matches!(
        flows.delete_identity_provider(&ctx, "github").await,
        Err(FlowError::Conflict(_))
    ));

    // without a password, the last provider is the only way in
    assert!(matches!(
        flows.delete_identity_provider(&ctx, "google").await,
        Err(FlowError::Conflict(_))
    ));

    let mut with_password = fixture.reload(&user).await;
    with_password.password_hash = Some("$argon2id$hash".to_string());
    fixture.users.save(with_password).await.unwrap();

    let updated = flows.delete_identity_provider(&ctx, "google").await.unwrap();
    assert!(updated.identity_providers.is_empty());
}
