//! Tokens around third-party OAuth2 login: the CSRF state of an authorization
//! redirect, and the short-lived proof that a signed-in user asked to link a provider.

use std::sync::Arc;

use rand::RngCore;
use subtle::ConstantTimeEq;
use tessera_common::{
    claims::{OAuth2ProviderConnectionTokenClaims, OAuth2StateTokenClaims},
    id::{SessionId, UserId},
    kind::TokenKind,
    user::User,
};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    codec::expiry,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

const STATE_LEN: usize = 32;

/// A minted or validated OAuth2 state token.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OAuth2State {
    /// The opaque `state` parameter sent to the provider.
    pub state: String,

    /// Where to send the user after the callback.
    pub redirect_uri: Option<String>,

    /// Whether a successful callback also grants a step-up token.
    pub step_up: bool,

    /// When the token stops validating.
    pub expires_at: OffsetDateTime,
    /// The signed token string.
    pub value: String,
}

/// Mints and validates OAuth2 state tokens.
#[derive(Clone)]
pub struct OAuth2StateTokenService {
    shared: Arc<Shared>,
}

impl OAuth2StateTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a state token with a fresh random `state` parameter.
    ///
    /// An empty redirect URI counts as none.
    pub fn create(
        &self,
        redirect_uri: Option<String>,
        step_up: bool,
    ) -> Result<OAuth2State, CreateError> {
        let mut raw = [0u8; STATE_LEN];
        rand::thread_rng().fill_bytes(&mut raw);

        let issued_at = self.shared.clock.now();
        let expires_at = expiry(issued_at, self.shared.config.oauth2_state.ttl())?;
        let claims = OAuth2StateTokenClaims {
            state: hexhex::hex(&raw).to_string(),
            redirect_uri: redirect_uri.filter(|uri| !uri.is_empty()),
            step_up,
        };
        let value = self
            .shared
            .codec
            .sign(TokenKind::OAuth2State, &claims, issued_at, expires_at)?;

        Ok(OAuth2State {
            state: claims.state,
            redirect_uri: claims.redirect_uri,
            step_up,
            expires_at,
            value,
        })
    }

    /// Extract the state token from `request` and validate it.
    pub fn extract(&self, request: &RequestContext) -> Result<OAuth2State, TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, TokenKind::OAuth2State, true)?
            .ok_or(TokenError::Missing(TokenKind::OAuth2State))?;

        self.validate(&value)
    }

    /// Validate a token string.
    pub fn validate(&self, value: &str) -> Result<OAuth2State, TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<OAuth2StateTokenClaims>(TokenKind::OAuth2State, value)
            .map_err(|err| TokenError::from_verify(TokenKind::OAuth2State, err))?;
        let claims = verified.claims;

        Ok(OAuth2State {
            state: claims.state,
            redirect_uri: claims.redirect_uri.filter(|uri| !uri.is_empty()),
            step_up: claims.step_up,
            expires_at: verified.expires_at,
            value: value.trim().to_string(),
        })
    }

    /// Validate the state token on a provider callback and compare it with the
    /// `state` parameter the provider returned.
    pub fn check(
        &self,
        request: &RequestContext,
        returned_state: &str,
    ) -> Result<OAuth2State, TokenError> {
        let state = self.extract(request)?;

        if !bool::from(state.state.as_bytes().ct_eq(returned_state.as_bytes())) {
            warn!("OAuth2 callback state mismatch");
            return Err(TokenError::Invalid(TokenKind::OAuth2State, "state mismatch"));
        }

        Ok(state)
    }
}

/// A pending provider link, bound to the user and session that asked for it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OAuth2ProviderConnection {
    /// The user the identity will be linked to.
    pub user_id: UserId,
    /// The session that started the link.
    pub session_id: SessionId,

    /// Provider key, e.g. `google`.
    pub provider: String,

    /// When the token stops validating.
    pub expires_at: OffsetDateTime,
    /// The signed token string.
    pub value: String,
}

/// Mints and validates OAuth2 provider connection tokens.
#[derive(Clone)]
pub struct OAuth2ProviderConnectionTokenService {
    shared: Arc<Shared>,
}

impl OAuth2ProviderConnectionTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a token for linking `provider` to the account of `user_id`.
    pub fn create(
        &self,
        user_id: UserId,
        session_id: SessionId,
        provider: &str,
    ) -> Result<OAuth2ProviderConnection, CreateError> {
        let issued_at = self.shared.clock.now();
        let expires_at = expiry(issued_at, self.shared.config.oauth2_provider_connection.ttl())?;
        let claims = OAuth2ProviderConnectionTokenClaims {
            sub: user_id,
            session_id,
            provider: provider.to_string(),
        };
        let value = self.shared.codec.sign(
            TokenKind::OAuth2ProviderConnection,
            &claims,
            issued_at,
            expires_at,
        )?;

        debug!(%user_id, provider, "provider connection started");

        Ok(OAuth2ProviderConnection {
            user_id,
            session_id,
            provider: claims.provider,
            expires_at,
            value,
        })
    }

    /// Extract the token from `request`, validate it and load the user.
    ///
    /// Fails if the session that started the link has ended.
    pub async fn extract(
        &self,
        request: &RequestContext,
    ) -> Result<(OAuth2ProviderConnection, User), TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, TokenKind::OAuth2ProviderConnection, true)?
            .ok_or(TokenError::Missing(TokenKind::OAuth2ProviderConnection))?;

        self.validate(&value).await
    }

    /// Validate a raw token value. The session it was issued in must still exist.
    pub async fn validate(
        &self,
        value: &str,
    ) -> Result<(OAuth2ProviderConnection, User), TokenError> {
        const KIND: TokenKind = TokenKind::OAuth2ProviderConnection;

        let verified = self
            .shared
            .codec
            .verify::<OAuth2ProviderConnectionTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;
        let claims = verified.claims;

        let user = self
            .shared
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(TokenError::Store)?
            .ok_or(TokenError::Invalid(KIND, "unknown user"))?;

        if user.session(claims.session_id).is_none() {
            debug!(user_id = %claims.sub, session_id = %claims.session_id, "provider connection for a deleted session");
            return Err(TokenError::Invalid(KIND, "session no longer exists"));
        }

        Ok((
            OAuth2ProviderConnection {
                user_id: claims.sub,
                session_id: claims.session_id,
                provider: claims.provider,
                expires_at: verified.expires_at,
                value: value.trim().to_string(),
            },
            user,
        ))
    }
}
