use fnv::FnvHashSet;
use serde_json::json;
use tessera_common::{
    claims::{AccessTokenClaims, OAuth2StateTokenClaims, TwoFactorAuthenticationTokenClaims},
    id::{SessionId, TokenId, UserId},
    user::Role,
};

#[test_log::test]
fn access_claims_wire_shape() {
    let claims = AccessTokenClaims {
        sub: UserId::from_uint(0xabcd),
        jti: TokenId::from_uint(1),
        session_id: "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap(),
        roles: FnvHashSet::from_iter([Role::Admin]),
        groups: FnvHashSet::default(),
    };

    let value = serde_json::to_value(&claims).unwrap();
    assert_eq!(value["sub"], json!("0000000000000000000000000000abcd"));
    assert_eq!(value["session_id"], json!("67e55044-10b1-426f-9247-bb680e5fe0c8"));
    assert_eq!(value["roles"], json!(["ADMIN"]));
    assert_eq!(value["groups"], json!([]));
}

#[test_log::test]
fn malformed_claims_are_rejected() {
    let bad_sub = json!({
        "sub": "not-hex",
        "jti": "00000000000000000000000000000001",
        "session_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
        "roles": [],
        "groups": [],
    });
    assert!(serde_json::from_value::<AccessTokenClaims>(bad_sub).is_err());

    let roles_not_a_list = json!({
        "sub": "0000000000000000000000000000abcd",
        "jti": "00000000000000000000000000000001",
        "session_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
        "roles": "ADMIN",
        "groups": [],
    });
    assert!(serde_json::from_value::<AccessTokenClaims>(roles_not_a_list).is_err());
}

#[test_log::test]
fn optional_claims_default_to_none() {
    let claims: TwoFactorAuthenticationTokenClaims =
        serde_json::from_value(json!({
            "sub": "0000000000000000000000000000abcd",
            "jti": "00000000000000000000000000000001",
        }))
        .unwrap();
    assert_eq!(None, claims.session_id);
    assert_eq!(TokenId::from_uint(1), claims.jti);

    // the login token id is not optional
    assert!(serde_json::from_value::<TwoFactorAuthenticationTokenClaims>(
        json!({ "sub": "0000000000000000000000000000abcd" })
    )
    .is_err());

    let state = OAuth2StateTokenClaims {
        state: "xyz".to_string(),
        redirect_uri: Some(String::new()),
        step_up: false,
    };
    let decoded: OAuth2StateTokenClaims =
        serde_json::from_value(serde_json::to_value(&state).unwrap()).unwrap();
    assert_eq!(state, decoded);
}

#[test_log::test]
fn session_ids_are_uuids() {
    let id = SessionId::random();
    assert_eq!(id, id.to_string().parse().unwrap());
    assert!("0000000000000000000000000000abcd0".parse::<SessionId>().is_err());
}
