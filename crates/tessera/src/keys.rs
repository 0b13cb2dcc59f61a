//! Signing keys and their rotation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use tessera_common::id::KeyId;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{clock::Clock, config::KeyRetention, error::KeyError};

/// Length of generated HMAC secrets in bytes.
const SECRET_LEN: usize = 32;

/// An HMAC signing secret and the id it is published under.
pub struct SigningKey {
    id: KeyId,
    secret: SecretSlice<u8>,
    created_at: OffsetDateTime,
}

impl SigningKey {
    /// Generate a new random key.
    pub fn generate(created_at: OffsetDateTime) -> Self {
        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret(KeyId::random(), secret, created_at)
    }

    /// Use existing secret material, e.g. loaded from a secret store.
    pub fn from_secret(id: KeyId, secret: Vec<u8>, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            secret: secret.into(),
            created_at,
        }
    }

    /// The key id placed in the `kid` token header.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// When the key was generated.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub(crate) fn encoding_key(&self) -> jsonwebtoken::EncodingKey {
        jsonwebtoken::EncodingKey::from_secret(self.secret.expose_secret())
    }

    pub(crate) fn decoding_key(&self) -> jsonwebtoken::DecodingKey {
        jsonwebtoken::DecodingKey::from_secret(self.secret.expose_secret())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Supplies the current signing key and resolves key ids for verification.
pub trait SigningKeyProvider: Send + Sync {
    /// The key new tokens are signed with.
    fn current_key(&self) -> Result<Arc<SigningKey>, KeyError>;

    /// Resolve the key a token was signed with.
    fn key_by_id(&self, id: KeyId) -> Result<Arc<SigningKey>, KeyError>;

    /// Make a newly generated key current, keeping the previous one for verification.
    fn rotate(&self) -> KeyId;
}

struct KeyRing {
    current: Arc<SigningKey>,

    /// Rotated keys, newest first.
    retired: Vec<Arc<SigningKey>>,
}

/// A [SigningKeyProvider] keeping its keys in memory.
///
/// Readers never block: the key ring is swapped atomically on rotation.
pub struct InMemoryKeyProvider {
    ring: ArcSwap<KeyRing>,
    retention: KeyRetention,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyProvider {
    /// Create a provider with `initial` as current key.
    pub fn new(initial: SigningKey, retention: KeyRetention, clock: Arc<dyn Clock>) -> Self {
        Self {
            ring: ArcSwap::from_pointee(KeyRing {
                current: Arc::new(initial),
                retired: vec![],
            }),
            retention,
            clock,
        }
    }

    /// Create a provider with a freshly generated current key.
    pub fn generate(retention: KeyRetention, clock: Arc<dyn Clock>) -> Self {
        let initial = SigningKey::generate(clock.now());
        Self::new(initial, retention, clock)
    }

    /// Remove a rotated key. Tokens signed with it stop verifying.
    pub fn retire(&self, id: KeyId) -> Result<(), KeyError> {
        let ring = self.ring.load();
        if ring.current.id == id {
            return Err(KeyError::RetireCurrent);
        }
        if !ring.retired.iter().any(|key| key.id == id) {
            return Err(KeyError::NotFound);
        }

        self.ring.rcu(|ring| KeyRing {
            current: ring.current.clone(),
            retired: ring
                .retired
                .iter()
                .filter(|key| key.id != id)
                .cloned()
                .collect(),
        });
        info!(%id, "retired signing key");

        Ok(())
    }

    /// Ids of all keys accepted for verification, current key first.
    pub fn key_ids(&self) -> Vec<KeyId> {
        let ring = self.ring.load();
        std::iter::once(ring.current.id)
            .chain(ring.retired.iter().map(|key| key.id))
            .collect()
    }

    fn retain(&self, retired: &mut Vec<Arc<SigningKey>>, now: OffsetDateTime) {
        match self.retention {
            KeyRetention::Forever => {}
            KeyRetention::Count { retired: keep } => retired.truncate(keep),
            KeyRetention::MaxAge { seconds } => {
                // an age that validation would reject purges nothing
                let oldest = Some(seconds)
                    .filter(|seconds| *seconds > 0)
                    .and_then(|seconds| now.checked_sub(Duration::seconds(seconds)));
                if let Some(oldest) = oldest {
                    retired.retain(|key| key.created_at >= oldest);
                }
            }
        }
    }
}

impl SigningKeyProvider for InMemoryKeyProvider {
    fn current_key(&self) -> Result<Arc<SigningKey>, KeyError> {
        Ok(self.ring.load().current.clone())
    }

    fn key_by_id(&self, id: KeyId) -> Result<Arc<SigningKey>, KeyError> {
        let ring = self.ring.load();
        if ring.current.id == id {
            return Ok(ring.current.clone());
        }

        ring.retired
            .iter()
            .find(|key| key.id == id)
            .cloned()
            .ok_or(KeyError::NotFound)
    }

    fn rotate(&self) -> KeyId {
        let now = self.clock.now();
        let new_key = Arc::new(SigningKey::generate(now));

        self.ring.rcu(|ring| {
            let mut retired = Vec::with_capacity(ring.retired.len() + 1);
            retired.push(ring.current.clone());
            retired.extend(ring.retired.iter().cloned());
            self.retain(&mut retired, now);

            KeyRing {
                current: new_key.clone(),
                retired,
            }
        });
        info!(id = %new_key.id, "rotated signing key");

        new_key.id
    }
}
