//! Long-lived refresh tokens, bound one-to-one to a session on the user aggregate.
//!
//! The session stores the id of the single valid refresh token. Issuing a new one
//! replaces that id, so every earlier refresh token of the session stops validating.

use std::{net::IpAddr, sync::Arc};

use tessera_common::{
    claims::RefreshTokenClaims,
    id::{SessionId, TokenId, UserId},
    kind::TokenKind,
    user::{GeoLocation, Session, SessionInfo, User},
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    codec::expiry,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

const KIND: TokenKind = TokenKind::Refresh;

/// A minted or validated refresh token.
#[derive(Clone, Debug)]
pub struct RefreshToken {
    /// The user the token was issued for.
    pub user_id: UserId,
    /// The session the token is bound to.
    pub session_id: SessionId,
    /// Must match the session's `refresh_token_id` to validate.
    pub token_id: TokenId,
    /// When the token stops validating.
    pub expires_at: OffsetDateTime,

    /// The signed token string.
    pub value: String,
}

/// Mints and validates refresh tokens and maintains the session they belong to.
#[derive(Clone)]
pub struct RefreshTokenService {
    shared: Arc<Shared>,
}

impl RefreshTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a refresh token for `session_id`, creating or updating the session.
    ///
    /// The session is persisted with the new token id before the token is signed.
    /// On success `user` holds the stored aggregate. If the store fails, `user` is
    /// left untouched.
    pub async fn create(
        &self,
        user: &mut User,
        session_id: SessionId,
        info: &SessionInfo,
        request: &RequestContext,
    ) -> Result<RefreshToken, CreateError> {
        let issued_at = self.shared.clock.now();
        let expires_at = expiry(issued_at, self.shared.config.refresh.ttl())?;
        let token_id = TokenId::random();

        let ip_address = request.client_ip();
        let location = match ip_address {
            Some(ip) => self.locate(ip).await,
            None => None,
        };

        let is_new = user.session(session_id).is_none();
        let mut updated = user.clone();
        updated.add_or_update_session(
            session_id,
            Session {
                refresh_token_id: token_id,
                browser: info.browser.clone(),
                os: info.os.clone(),
                issued_at,
                ip_address,
                location,
            },
        );

        *user = self
            .shared
            .users
            .save(updated)
            .await
            .map_err(CreateError::Store)?;

        let claims = RefreshTokenClaims {
            sub: user.id,
            jti: token_id,
            session_id,
        };
        let value = self.shared.codec.sign(KIND, &claims, issued_at, expires_at)?;

        if is_new {
            info!(user_id = %user.id, %session_id, "session created");
        } else {
            debug!(user_id = %user.id, %session_id, "refresh token rotated");
        }

        Ok(RefreshToken {
            user_id: user.id,
            session_id,
            token_id,
            expires_at,
            value,
        })
    }

    /// Extract the refresh token from the request and validate it.
    pub async fn extract(&self, request: &RequestContext) -> Result<RefreshToken, TokenError> {
        self.extract_with_user(request).await.map(|(token, _)| token)
    }

    /// Like [Self::extract], also returning the user the token belongs to.
    pub async fn extract_with_user(
        &self,
        request: &RequestContext,
    ) -> Result<(RefreshToken, User), TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, KIND, true)?
            .ok_or(TokenError::Missing(KIND))?;

        self.validate(&value).await
    }

    /// Validate a raw token value against the session it claims to belong to.
    pub async fn validate(&self, value: &str) -> Result<(RefreshToken, User), TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<RefreshTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;
        let claims = verified.claims;

        let user = self
            .shared
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(TokenError::Store)?
            .ok_or(TokenError::Invalid(KIND, "unknown user"))?;

        let session = user
            .session(claims.session_id)
            .ok_or(TokenError::Invalid(KIND, "unknown session"))?;
        if session.refresh_token_id != claims.jti {
            warn!(user_id = %claims.sub, session_id = %claims.session_id, "superseded refresh token presented");
            return Err(TokenError::Invalid(KIND, "superseded"));
        }

        Ok((
            RefreshToken {
                user_id: claims.sub,
                session_id: claims.session_id,
                token_id: claims.jti,
                expires_at: verified.expires_at,
                value: value.trim().to_string(),
            },
            user,
        ))
    }

    async fn locate(&self, ip: IpAddr) -> Option<GeoLocation> {
        let geo = self.shared.geo.as_ref()?;

        match tokio::time::timeout(self.shared.config.geolocation_timeout(), geo.resolve(ip)).await
        {
            Ok(Ok(location)) => Some(location),
            Ok(Err(err)) => {
                warn!(?err, %ip, "geolocation failed");
                None
            }
            Err(_) => {
                warn!(%ip, "geolocation timed out");
                None
            }
        }
    }
}
