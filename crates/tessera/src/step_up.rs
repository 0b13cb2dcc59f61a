//! Step-up tokens: short-lived proof of a recent re-authentication, bound to one
//! user and session.

use std::sync::Arc;

use tessera_common::{
    claims::StepUpTokenClaims,
    id::{SessionId, UserId},
    kind::TokenKind,
};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    codec::expiry,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

const KIND: TokenKind = TokenKind::StepUp;

/// A minted or validated step-up token.
#[derive(Clone, Debug)]
pub struct StepUpToken {
    /// The user that re-authenticated.
    pub user_id: UserId,
    /// The only session the token is accepted in.
    pub session_id: SessionId,
    /// When the token stops validating.
    pub expires_at: OffsetDateTime,

    /// The signed token string.
    pub value: String,
}

/// Mints and validates step-up tokens.
#[derive(Clone)]
pub struct StepUpTokenService {
    shared: Arc<Shared>,
}

impl StepUpTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Mint a step-up token for `session_id`.
    pub fn create(&self, user_id: UserId, session_id: SessionId) -> Result<StepUpToken, CreateError> {
        self.create_at(user_id, session_id, self.shared.clock.now())
    }

    /// Like [Self::create], with an explicit issue time.
    pub fn create_at(
        &self,
        user_id: UserId,
        session_id: SessionId,
        issued_at: OffsetDateTime,
    ) -> Result<StepUpToken, CreateError> {
        let expires_at = expiry(issued_at, self.shared.config.step_up.ttl())?;
        let claims = StepUpTokenClaims {
            sub: user_id,
            session_id,
        };
        let value = self.shared.codec.sign(KIND, &claims, issued_at, expires_at)?;

        debug!(%user_id, %session_id, "step-up token issued");

        Ok(StepUpToken {
            user_id,
            session_id,
            expires_at,
            value,
        })
    }

    /// Mint a step-up token after a recovery code was redeemed.
    ///
    /// Only allowed while serving the configured recovery path.
    pub fn create_for_recovery(
        &self,
        user_id: UserId,
        session_id: SessionId,
        request: &RequestContext,
    ) -> Result<StepUpToken, CreateError> {
        self.ensure_recovery_path(request)?;
        self.create(user_id, session_id)
    }

    pub(crate) fn ensure_recovery_path(&self, request: &RequestContext) -> Result<(), CreateError> {
        if request.path() != self.shared.config.recovery_path {
            warn!(path = request.path(), "step-up after recovery requested outside the recovery endpoint");
            return Err(CreateError::Forbidden(
                "step-up after recovery is only issued by the recovery endpoint",
            ));
        }
        Ok(())
    }

    /// Extract the step-up token from the request and validate it for the given principal.
    pub fn extract(
        &self,
        request: &RequestContext,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<StepUpToken, TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, KIND, true)?
            .ok_or(TokenError::Missing(KIND))?;

        self.validate(&value, user_id, session_id)
    }

    /// Validate a raw token value. The token must name `user_id` and `session_id`.
    pub fn validate(
        &self,
        value: &str,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<StepUpToken, TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<StepUpTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;
        let claims = verified.claims;

        if claims.sub != user_id {
            return Err(TokenError::Invalid(KIND, "issued for another user"));
        }
        if claims.session_id != session_id {
            return Err(TokenError::Invalid(KIND, "issued for another session"));
        }

        Ok(StepUpToken {
            user_id,
            session_id,
            expires_at: verified.expires_at,
            value: value.trim().to_string(),
        })
    }
}
