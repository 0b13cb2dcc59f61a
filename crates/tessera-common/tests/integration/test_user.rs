use tessera_common::{
    id::{SessionId, TokenId, UserId},
    user::{Role, Session, SessionInfo, TotpEnrollment, TwoFactorState, User},
};
use time::{Duration, OffsetDateTime};

fn session(info: &SessionInfo) -> Session {
    Session {
        refresh_token_id: TokenId::random(),
        browser: info.browser.clone(),
        os: info.os.clone(),
        issued_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        ip_address: Some("10.0.0.1".parse().unwrap()),
        location: None,
    }
}

#[test_log::test]
fn session_bookkeeping() {
    let mut user = User::new(UserId::random(), "me@mail.com");
    let first = SessionId::random();
    let second = SessionId::random();

    user.add_or_update_session(first, session(&SessionInfo::default()));
    user.add_or_update_session(second, session(&SessionInfo::default()));
    assert_eq!(2, user.sessions.len());

    assert!(user.remove_session(first).is_some());
    assert!(user.remove_session(first).is_none());
    assert!(user.session(second).is_some());

    user.clear_sessions();
    assert!(user.sessions.is_empty());
}

#[test_log::test]
fn replacing_session_keeps_one_entry() {
    let mut user = User::new(UserId::random(), "me@mail.com");
    let session_id = SessionId::random();

    let old = session(&SessionInfo::default());
    let new = session(&SessionInfo {
        browser: Some("Firefox".to_string()),
        os: Some("Linux".to_string()),
    });
    user.add_or_update_session(session_id, old.clone());
    user.add_or_update_session(session_id, new.clone());

    assert_eq!(1, user.sessions.len());
    assert_eq!(Some(&new), user.session(session_id));
    assert_ne!(old.refresh_token_id, new.refresh_token_id);
}

#[test_log::test]
fn admin_is_member_of_every_group() {
    let mut user = User::new(UserId::random(), "me@mail.com");
    assert!(user.has_role(Role::User));
    assert!(!user.is_member_of("pilots"));

    user.groups.insert("pilots".to_string());
    assert!(user.is_member_of("pilots"));
    assert!(!user.is_member_of("mechanics"));

    user.roles.insert(Role::Admin);
    assert!(user.is_member_of("mechanics"));
}

#[test_log::test]
fn two_factor_enabled_by_any_factor() {
    let mut user = User::new(UserId::random(), "me@mail.com");
    assert!(!user.two_factor.is_enabled());

    user.two_factor.email_enabled = true;
    assert!(user.two_factor.is_enabled());

    user.two_factor.email_enabled = false;
    user.two_factor.totp = Some(TotpEnrollment {
        secret: "JBSWY3DPEHPK3PXP".to_string(),
        recovery_code_hashes: vec![],
    });
    assert!(user.two_factor.is_enabled());
}

#[test_log::test]
fn user_serde_roundtrip() {
    let mut user = User::new(UserId::random(), "me@mail.com");
    user.add_or_update_session(SessionId::random(), session(&SessionInfo::default()));

    let json = serde_json::to_string(&user).unwrap();
    let decoded: User = serde_json::from_str(&json).unwrap();
    assert_eq!(user, decoded);
}

#[test_log::test]
fn consumed_login_tokens_expire_from_the_record() {
    let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let mut state = TwoFactorState::default();
    let first = TokenId::random();
    let second = TokenId::random();

    state.consume_login_token(first, start + Duration::minutes(5), start);
    assert!(state.is_login_token_consumed(first));
    assert!(!state.is_login_token_consumed(second));

    state.consume_login_token(second, start + Duration::minutes(15), start + Duration::minutes(10));
    assert!(!state.is_login_token_consumed(first));
    assert!(state.is_login_token_consumed(second));
    assert_eq!(1, state.consumed_login_tokens.len());
}
