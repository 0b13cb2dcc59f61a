//! Signing and verification of claim sets as compact JWS tokens.
//!
//! The codec owns the registered claims `iat` and `exp` and the `purpose`
//! namespace claim. Callers only deal with their typed custom claims.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tessera_common::{id::KeyId, kind::TokenKind};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    error::{self, SignError, VerifyError},
    keys::SigningKeyProvider,
};

const IAT: &str = "iat";
const EXP: &str = "exp";
const PURPOSE: &str = "purpose";

const ALGORITHM: Algorithm = Algorithm::HS256;

/// A verified token: the typed claims plus the registered claims the codec checked.
#[derive(Clone, Debug)]
pub struct Verified<C> {
    /// The custom claims.
    pub claims: C,

    /// The `iat` claim.
    pub issued_at: OffsetDateTime,

    /// The `exp` claim.
    pub expires_at: OffsetDateTime,

    /// The key the token was signed with.
    pub key_id: KeyId,
}

/// Signs and verifies tokens with the keys of a [SigningKeyProvider].
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<dyn SigningKeyProvider>,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl TokenCodec {
    /// Create a new codec.
    pub fn new(keys: Arc<dyn SigningKeyProvider>, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // expiry is checked against the injected clock, without leeway
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            keys,
            clock,
            validation,
        }
    }

    /// Sign `claims` under the purpose of `kind`.
    ///
    /// `claims` must serialize to a JSON object that does not use the reserved claims
    /// `iat`, `exp` or `purpose`.
    pub fn sign<C: Serialize>(
        &self,
        kind: TokenKind,
        claims: &C,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<String, SignError> {
        if expires_at <= issued_at {
            return Err(SignError::Encoding(anyhow::anyhow!(
                "expiry must be after issue time"
            )));
        }

        let mut payload = match serde_json::to_value(claims).map_err(error::encoding)? {
            Value::Object(map) => map,
            _ => {
                return Err(SignError::Encoding(anyhow::anyhow!(
                    "claims must serialize to an object"
                )))
            }
        };

        for reserved in [IAT, EXP, PURPOSE] {
            if payload.contains_key(reserved) {
                return Err(SignError::Encoding(anyhow::anyhow!(
                    "claims use reserved name `{reserved}`"
                )));
            }
        }

        payload.insert(IAT.to_string(), issued_at.unix_timestamp().into());
        payload.insert(EXP.to_string(), expires_at.unix_timestamp().into());
        payload.insert(PURPOSE.to_string(), kind.purpose().into());

        let key = self
            .keys
            .current_key()
            .map_err(|_| SignError::Secret("no current signing key"))?;

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(key.id().to_string());

        jsonwebtoken::encode(&header, &payload, &key.encoding_key()).map_err(error::encoding)
    }

    /// Verify `token` as a token of `kind` and parse its custom claims.
    ///
    /// Nothing in the payload is looked at before the signature has been verified.
    pub fn verify<C: DeserializeOwned>(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<Verified<C>, VerifyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerifyError::Missing);
        }

        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| VerifyError::Invalid("malformed token"))?;
        if header.alg != ALGORITHM {
            return Err(VerifyError::Invalid("unexpected algorithm"));
        }

        let key_id: KeyId = header
            .kid
            .as_deref()
            .ok_or(VerifyError::Invalid("missing key id"))?
            .parse()
            .map_err(|_| VerifyError::Invalid("malformed key id"))?;

        let key = self.keys.key_by_id(key_id).map_err(|_| {
            warn!(%key_id, %kind, "token signed with unknown key");
            VerifyError::Invalid("unknown signing key")
        })?;

        let data = jsonwebtoken::decode::<Map<String, Value>>(
            token,
            &key.decoding_key(),
            &self.validation,
        )
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                VerifyError::Invalid("signature mismatch")
            }
            _ => VerifyError::Invalid("malformed token"),
        })?;

        let mut payload = data.claims;

        match payload.remove(PURPOSE) {
            Some(Value::String(purpose)) if purpose == kind.purpose() => {}
            _ => {
                debug!(%kind, "token presented for the wrong purpose");
                return Err(VerifyError::Invalid("wrong purpose"));
            }
        }

        let issued_at = timestamp_claim(&mut payload, IAT)?;
        let expires_at = timestamp_claim(&mut payload, EXP)?;
        if expires_at <= issued_at {
            return Err(VerifyError::Invalid("expiry not after issue time"));
        }
        if expires_at <= self.clock.now() {
            return Err(VerifyError::Expired);
        }

        let claims = serde_json::from_value(Value::Object(payload))
            .map_err(|_| VerifyError::Invalid("malformed claims"))?;

        Ok(Verified {
            claims,
            issued_at,
            expires_at,
            key_id,
        })
    }
}

/// `issued_at + ttl`, or an encoding error where that is not representable.
pub(crate) fn expiry(issued_at: OffsetDateTime, ttl: Duration) -> Result<OffsetDateTime, SignError> {
    issued_at
        .checked_add(ttl)
        .ok_or_else(|| SignError::Encoding(anyhow::anyhow!("expiry out of range")))
}

fn timestamp_claim(
    payload: &mut Map<String, Value>,
    name: &'static str,
) -> Result<OffsetDateTime, VerifyError> {
    payload
        .remove(name)
        .and_then(|value| value.as_i64())
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .ok_or(VerifyError::Invalid("malformed timestamp claim"))
}
