use std::sync::Arc;

use tessera_common::{
    claims::TwoFactorAuthenticationTokenClaims,
    id::{SessionId, TokenId, UserId},
    kind::TokenKind,
};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    codec::expiry,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

const KIND: TokenKind = TokenKind::TwoFactorAuthentication;

/// Proof that the first factor succeeded, pending the second.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TwoFactorAuthenticationToken {
    /// The user whose password was verified.
    pub user_id: UserId,

    /// The `jti`, recorded on the user when the token is exchanged.
    pub token_id: TokenId,

    /// The session to continue, if the first factor happened inside one.
    pub session_id: Option<SessionId>,

    /// When the token stops validating.
    pub expires_at: OffsetDateTime,

    /// The signed token string.
    pub value: String,
}

/// Mints and validates two-factor authentication tokens.
#[derive(Clone)]
pub struct TwoFactorAuthenticationTokenService {
    shared: Arc<Shared>,
}

impl TwoFactorAuthenticationTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a token for `user_id`, optionally continuing `session_id`.
    pub fn create(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
    ) -> Result<TwoFactorAuthenticationToken, CreateError> {
        let issued_at = self.shared.clock.now();
        let expires_at = expiry(issued_at, self.shared.config.two_factor_authentication.ttl())?;
        let token_id = TokenId::random();
        let claims = TwoFactorAuthenticationTokenClaims {
            sub: user_id,
            jti: token_id,
            session_id,
        };
        let value = self.shared.codec.sign(KIND, &claims, issued_at, expires_at)?;

        debug!(%user_id, "second factor pending");

        Ok(TwoFactorAuthenticationToken {
            user_id,
            token_id,
            session_id,
            expires_at,
            value,
        })
    }

    /// Extract the token from `request` and validate it.
    ///
    /// Whether the token was already exchanged is checked by the flow, against the user.
    pub fn extract(
        &self,
        request: &RequestContext,
    ) -> Result<TwoFactorAuthenticationToken, TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, KIND, true)?
            .ok_or(TokenError::Missing(KIND))?;

        self.validate(&value)
    }

    /// Validate a token string.
    pub fn validate(&self, value: &str) -> Result<TwoFactorAuthenticationToken, TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<TwoFactorAuthenticationTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;

        Ok(TwoFactorAuthenticationToken {
            user_id: verified.claims.sub,
            token_id: verified.claims.jti,
            session_id: verified.claims.session_id,
            expires_at: verified.expires_at,
            value: value.trim().to_string(),
        })
    }
}
