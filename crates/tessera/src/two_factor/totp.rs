//! TOTP enrollment: the setup token carries the candidate secret and recovery
//! codes until the user proves possession with a first code.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tessera_common::{
    claims::TotpSetupTokenClaims,
    id::UserId,
    kind::TokenKind,
    user::User,
};
use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, warn};

use crate::{
    codec::expiry,
    config::TotpConfig,
    error::{CreateError, TokenError},
    extract::RequestContext,
    Shared,
};

use super::codes;

const KIND: TokenKind = TokenKind::TotpSetup;

/// A pending TOTP enrollment.
pub struct TotpSetupToken {
    /// The enrolling user.
    pub user_id: UserId,

    /// Base32 shared secret.
    pub secret: SecretString,

    /// Recovery codes in display form, shown to the user once.
    pub recovery_codes: Vec<String>,

    /// When the token stops validating.
    pub expires_at: OffsetDateTime,
    /// The signed token string.
    pub value: String,
}

impl std::fmt::Debug for TotpSetupToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpSetupToken")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What the client needs to start enrollment.
#[derive(Debug)]
pub struct TotpSetup {
    /// The setup token.
    pub token: TotpSetupToken,

    /// `otpauth://` URI for authenticator apps.
    pub provisioning_uri: String,
}

/// Mints and validates TOTP setup tokens.
#[derive(Clone)]
pub struct TotpSetupTokenService {
    shared: Arc<Shared>,
}

impl TotpSetupTokenService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Start enrollment for `user` with a new secret and recovery codes.
    pub fn create(&self, user: &User) -> Result<TotpSetup, CreateError> {
        let secret = Secret::generate_secret().to_encoded().to_string();
        let recovery_codes = codes::generate_recovery_codes();

        let totp = build(&self.shared.config.totp, &secret, &user.email)
            .ok_or_else(|| CreateError::Encoding(anyhow::anyhow!("invalid TOTP parameters")))?;

        let issued_at = self.shared.clock.now();
        let expires_at = expiry(issued_at, self.shared.config.totp_setup.ttl())?;
        let claims = TotpSetupTokenClaims {
            sub: user.id,
            secret,
            recovery_codes,
        };
        let value = self.shared.codec.sign(KIND, &claims, issued_at, expires_at)?;

        debug!(user_id = %user.id, "TOTP setup started");

        Ok(TotpSetup {
            provisioning_uri: totp.get_url(),
            token: TotpSetupToken {
                user_id: user.id,
                secret: claims.secret.into(),
                recovery_codes: claims.recovery_codes,
                expires_at,
                value,
            },
        })
    }

    /// Extract the setup token from `request` and validate it for `user_id`.
    pub fn extract(
        &self,
        request: &RequestContext,
        user_id: UserId,
    ) -> Result<TotpSetupToken, TokenError> {
        let value = self
            .shared
            .extractor
            .extract_value(request, KIND, true)?
            .ok_or(TokenError::Missing(KIND))?;

        self.validate(&value, user_id)
    }

    /// Validate a raw token value. The token must have been issued to `user_id`.
    pub fn validate(&self, value: &str, user_id: UserId) -> Result<TotpSetupToken, TokenError> {
        let verified = self
            .shared
            .codec
            .verify::<TotpSetupTokenClaims>(KIND, value)
            .map_err(|err| TokenError::from_verify(KIND, err))?;
        let claims = verified.claims;

        if claims.sub != user_id {
            warn!(%user_id, token_user_id = %claims.sub, "TOTP setup token presented by another user");
            return Err(TokenError::Invalid(KIND, "issued for another user"));
        }

        Ok(TotpSetupToken {
            user_id,
            secret: claims.secret.into(),
            recovery_codes: claims.recovery_codes,
            expires_at: verified.expires_at,
            value: value.trim().to_string(),
        })
    }
}

impl TotpSetupToken {
    /// Whether `code` is currently valid for the candidate secret.
    pub(crate) fn verify_code(&self, config: &TotpConfig, code: &str, now: OffsetDateTime) -> bool {
        verify_code(config, self.secret.expose_secret(), code, now)
    }
}

fn build(config: &TotpConfig, secret: &str, account: &str) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().ok()?;
    TOTP::new(
        Algorithm::SHA1,
        config.digits,
        config.skew,
        config.step,
        bytes,
        Some(config.issuer.clone()),
        account.to_string(),
    )
    .ok()
}

/// Check a TOTP code against a base32 secret at `now`, allowing the configured skew.
pub(crate) fn verify_code(
    config: &TotpConfig,
    secret: &str,
    code: &str,
    now: OffsetDateTime,
) -> bool {
    // the account label is not part of the code computation
    let Some(totp) = build(config, secret, "verify") else {
        warn!("stored TOTP secret is unusable");
        return false;
    };
    let Ok(time) = u64::try_from(now.unix_timestamp()) else {
        return false;
    };
    let code: String = code.chars().filter(|ch| !ch.is_whitespace()).collect();

    totp.check(&code, time)
}

/// The code an authenticator would show for `secret` at `now`.
#[cfg(test)]
pub(crate) fn current_code(config: &TotpConfig, secret: &str, now: OffsetDateTime) -> String {
    build(config, secret, "verify")
        .map(|totp| totp.generate(now.unix_timestamp() as u64))
        .unwrap_or_default()
}
