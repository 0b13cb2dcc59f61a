use secrecy::ExposeSecret;
use tessera::{
    common::kind::TokenKind,
    flow::StepUpProof,
    AuthError, FlowError, TokenError,
};

use crate::support::{firefox, Fixture};

#[test_log::test(tokio::test)]
async fn setup_requires_step_up() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;

    assert!(matches!(
        fixture
            .services
            .flows()
            .begin_totp_setup(&fixture.ctx_for(&tokens).await)
            .await,
        Err(FlowError::Auth(AuthError::StepUpRequired(_)))
    ));
}

#[test_log::test(tokio::test)]
async fn enrollment_resets_sessions() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let other_device = fixture.login(&user).await;
    let mut tokens = fixture.login(&user).await;
    let flows = fixture.services.flows();

    let ctx = fixture.ctx_for(&tokens).await;
    tokens.step_up = Some(
        flows
            .step_up(&ctx, StepUpProof::PasswordVerified)
            .await
            .unwrap(),
    );
    let ctx = fixture.ctx_for(&tokens).await;

    let setup = flows.begin_totp_setup(&ctx).await.unwrap();
    assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));
    assert_eq!(10, setup.token.recovery_codes.len());
    assert!(fixture.reload(&user).await.two_factor.totp.is_none());

    let code = fixture.totp_code(setup.token.secret.expose_secret());
    let enabled = flows
        .complete_totp_setup(&ctx, &setup.token.value, &code, &firefox())
        .await
        .unwrap();
    assert_eq!(setup.token.recovery_codes, enabled.recovery_codes);
    assert!(enabled.tokens.step_up.is_some());

    let stored = fixture.reload(&user).await;
    let enrollment = stored.two_factor.totp.as_ref().unwrap();
    assert_eq!(setup.token.secret.expose_secret(), enrollment.secret);
    assert_eq!(10, enrollment.recovery_code_hashes.len());

    // every earlier session is gone, only the fresh one remains
    assert_eq!(1, stored.sessions.len());
    assert!(stored.session(enabled.tokens.access.session_id).is_some());
    for old in [&other_device, &tokens] {
        assert!(fixture.services.access().validate(&old.access.value).await.is_err());
    }
    assert!(fixture
        .services
        .access()
        .validate(&enabled.tokens.access.value)
        .await
        .is_ok());
}

#[test_log::test(tokio::test)]
async fn wrong_code_changes_nothing() {
    let fixture = Fixture::new();
    let user = fixture.user("ada@example.com").await;
    let tokens = fixture.login(&user).await;
    let ctx = fixture.ctx_for(&tokens).await;
    let setup = fixture.services.totp_setup().create(&user).unwrap();
    let before = fixture.reload(&user).await;

    assert!(matches!(
        fixture
            .services
            .flows()
            .complete_totp_setup(&ctx, &setup.token.value, "12345x", &firefox())
            .await,
        Err(FlowError::InvalidCode)
    ));
    assert_eq!(before, fixture.reload(&user).await);
}

#[test_log::test(tokio::test)]
async fn setup_token_of_another_user_is_invalid() {
    let fixture = Fixture::new();
    let alice = fixture.user("alice@example.com").await;
    let mallory = fixture.user("mallory@example.com").await;
    let mallory_ctx = fixture.ctx_for(&fixture.login(&mallory).await).await;
    let before = fixture.reload(&mallory).await;

    let alice_setup = fixture.services.totp_setup().create(&alice).unwrap();
    let code = fixture.totp_code(alice_setup.token.secret.expose_secret());

    assert!(matches!(
        fixture
            .services
            .flows()
            .complete_totp_setup(&mallory_ctx, &alice_setup.token.value, &code, &firefox())
            .await,
        Err(FlowError::Token(TokenError::Invalid(TokenKind::TotpSetup, _)))
    ));
    assert_eq!(before, fixture.reload(&mallory).await);
    assert!(fixture.reload(&alice).await.two_factor.totp.is_none());
}

#[test_log::test(tokio::test)]
async fn disable_totp() {
    let fixture = Fixture::new();
    let (user, secret, _) = fixture.totp_user("ada@example.com").await;
    let tokens = fixture.login_with_totp(&user, &secret).await;
    let flows = fixture.services.flows();

    let without_step_up = fixture
        .ctx(&[(TokenKind::Access, &tokens.access.value)])
        .await;
    assert!(matches!(
        flows.disable_totp(&without_step_up).await,
        Err(FlowError::Auth(AuthError::StepUpRequired(_)))
    ));

    let updated = flows
        .disable_totp(&fixture.ctx_for(&tokens).await)
        .await
        .unwrap();
    assert!(updated.two_factor.totp.is_none());
    assert!(!fixture.reload(&user).await.two_factor.is_enabled());

    assert!(matches!(
        flows.disable_totp(&fixture.ctx_for(&tokens).await).await,
        Err(FlowError::Conflict(_))
    ));
}

#[test_log::test(tokio::test)]
async fn already_enrolled() {
    let fixture = Fixture::new();
    let (user, secret, _) = fixture.totp_user("ada@example.com").await;
    let tokens = fixture.login_with_totp(&user, &secret).await;

    assert!(matches!(
        fixture
            .services
            .flows()
            .begin_totp_setup(&fixture.ctx_for(&tokens).await)
            .await,
        Err(FlowError::Conflict(_))
    ));
}
