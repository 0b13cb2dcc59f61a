//! Short-lived bearer credentials, revocable through the allowlist.

use std::sync::Arc;

use fnv::FnvHashSet;
use tessera_common::{
    claims::AccessTokenClaims,
    id::{SessionId, TokenId, UserId},
    kind::TokenKind,
    user::{Role, User},
};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    codec::expiry,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

const KIND: TokenKind = TokenKind::Access;

/// A minted or validated access token.
#[derive(Clone, Debug)]
pub struct AccessToken {
    /// The user the token was issued for.
    pub user_id: UserId,
    /// The session the token belongs to.
    pub session_id: SessionId,

    /// The allowlisted `jti`.
    pub token_id: TokenId,

    /// Roles at issue time.
    pub roles: FnvHashSet<Role>,

    /// Group keys at issue time.
    pub groups: FnvHashSet<String>,

    /// When the token stops validating.
    pub expires_at: OffsetDateTime,

    /// The signed token string.
    pub value: String,
}

/// The result of looking for an access token on a request that does not require one.
#[derive(Clone, Debug)]
pub enum AuthenticationOutcome {
    /// A valid, allowlisted token was presented.
    Authenticated(AccessToken),

    /// No token was presented.
    None,
}

impl AuthenticationOutcome {
    /// The token, if authenticated.
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Self::Authenticated(token) => Some(token),
            Self::None => None,
        }
    }
}

/// Mints and validates access tokens.
#[derive(Clone)]
pub struct AccessTokenService {
    shared: Arc<Shared>,
}

impl AccessTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a new access token for `session_id`, superseding any earlier one.
    ///
    /// The token id is allowlisted before the token is signed, so a token is never
    /// handed out that would not validate.
    pub async fn create(&self, user: &User, session_id: SessionId) -> Result<AccessToken, CreateError> {
        self.create_at(user, session_id, self.shared.clock.now())
            .await
    }

    /// Like [Self::create], with an explicit issue time.
    pub async fn create_at(
        &self,
        user: &User,
        session_id: SessionId,
        issued_at: OffsetDateTime,
    ) -> Result<AccessToken, CreateError> {
        let ttl = self.shared.config.access.ttl();
        let expires_at = expiry(issued_at, ttl)?;
        let token_id = TokenId::random();

        self.shared
            .allowlist
            .allow(user.id, session_id, token_id, ttl)
            .await
            .map_err(CreateError::Cache)?;

        let claims = AccessTokenClaims {
            sub: user.id,
            jti: token_id,
            session_id,
            roles: user.roles.clone(),
            groups: user.groups.clone(),
        };
        let value = self.shared.codec.sign(KIND, &claims, issued_at, expires_at)?;

        debug!(user_id = %user.id, %session_id, "access token issued");

        Ok(AccessToken {
            user_id: user.id,
            session_id,
            token_id,
            roles: claims.roles,
            groups: claims.groups,
            expires_at,
            value,
        })
    }

    /// Look for an access token on the request and validate it.
    ///
    /// Without a token, returns [AuthenticationOutcome::None] unless `required`.
    pub async fn extract(
        &self,
        request: &RequestContext,
        required: bool,
    ) -> Result<AuthenticationOutcome, TokenError> {
        let Some(value) = self
            .shared
            .extractor
            .extract_value(request, KIND, required)?
        else {
            return Ok(AuthenticationOutcome::None);
        };

        Ok(AuthenticationOutcome::Authenticated(
            self.validate(&value).await?,
        ))
    }

    /// Validate a raw token value.
    ///
    /// A correctly signed token that is no longer allowlisted counts as expired.
    pub async fn validate(&self, value: &str) -> Result<AccessToken, TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<AccessTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;
        let claims = verified.claims;

        let allowed = self
            .shared
            .allowlist
            .is_valid(claims.sub, claims.session_id, claims.jti)
            .await
            .map_err(TokenError::Cache)?;
        if !allowed {
            debug!(user_id = %claims.sub, session_id = %claims.session_id, "access token superseded or revoked");
            return Err(TokenError::Expired(KIND));
        }

        Ok(AccessToken {
            user_id: claims.sub,
            session_id: claims.session_id,
            token_id: claims.jti,
            roles: claims.roles,
            groups: claims.groups,
            expires_at: verified.expires_at,
            value: value.trim().to_string(),
        })
    }
}
