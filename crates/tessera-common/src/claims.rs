//! Typed claim sets for each token kind.
//!
//! These are the custom claims only. The registered claims `iat`, `exp` and the
//! `purpose` namespace are owned by the codec and never appear in these structs.

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    id::{SessionId, TokenId, UserId},
    user::Role,
};

/// Claims for the access token JWT
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AccessTokenClaims {
    /// The user the token was issued for.
    pub sub: UserId,

    /// The allowlisted token id.
    pub jti: TokenId,

    /// The session the token belongs to.
    pub session_id: SessionId,

    /// The user's roles at the time the token was issued.
    pub roles: FnvHashSet<Role>,

    /// The user's group keys at the time the token was issued.
    pub groups: FnvHashSet<String>,
}

/// Claims for the refresh token JWT
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct RefreshTokenClaims {
    /// The user the token was issued for.
    pub sub: UserId,

    /// Must equal the `refresh_token_id` stored on the session.
    pub jti: TokenId,

    /// The session the token is bound to.
    pub session_id: SessionId,
}

/// Claims for the step-up token JWT
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct StepUpTokenClaims {
    /// The user that re-authenticated.
    pub sub: UserId,

    /// The session the re-authentication happened in.
    pub session_id: SessionId,
}

/// Claims for the token handed out after a password check when a second factor is pending.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct TwoFactorAuthenticationTokenClaims {
    /// The user whose password was verified.
    pub sub: UserId,

    /// Recorded on the user once the token is exchanged, so it is exchanged at most once.
    pub jti: TokenId,

    /// Set when the pending login continues an existing session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Claims carrying TOTP enrollment material that is not yet persisted.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct TotpSetupTokenClaims {
    /// The user enrolling.
    pub sub: UserId,

    /// Base32-encoded TOTP secret.
    pub secret: String,

    /// Plaintext recovery codes, hashed only once enrollment completes.
    pub recovery_codes: Vec<String>,
}

/// Claims binding the OAuth2 `state` parameter to the flow that started it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct OAuth2StateTokenClaims {
    /// The random `state` parameter sent to the provider.
    pub state: String,

    /// Where to send the user after the provider returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Whether the returning flow must enforce a step-up.
    pub step_up: bool,
}

/// Claims binding a pending OAuth2 identity link to the account and session that started it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct OAuth2ProviderConnectionTokenClaims {
    /// The logged-in user the identity is linked to.
    pub sub: UserId,

    /// The session that started the link; it must still exist on completion.
    pub session_id: SessionId,

    /// The OAuth2 provider key, e.g. `github`.
    pub provider: String,
}
