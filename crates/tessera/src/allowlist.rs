//! The access token allowlist.
//!
//! Access tokens are stateless JWTs. To be able to revoke them instantly, every
//! (user, session) pair has exactly one allowlisted token id, and an access token
//! is only accepted while its `jti` is that id.

use std::sync::Arc;

use async_trait::async_trait;
use fnv::FnvHashMap;
use tessera_common::id::{SessionId, TokenId, UserId};
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::clock::Clock;

/// A key-value cache holding the allowlisted access token id per (user, session).
///
/// Implementations must make a single [AllowlistCache::allow] write atomically
/// visible to subsequent reads. Concurrent writers for the same session resolve
/// as last writer wins.
#[async_trait]
pub trait AllowlistCache: Send + Sync {
    /// Make `token_id` the only valid access token id for the session, for at most `ttl`.
    async fn allow(
        &self,
        user_id: UserId,
        session_id: SessionId,
        token_id: TokenId,
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Whether `token_id` is the currently allowlisted id for the session.
    async fn is_valid(
        &self,
        user_id: UserId,
        session_id: SessionId,
        token_id: TokenId,
    ) -> anyhow::Result<bool>;

    /// Forget the session's entry.
    async fn invalidate_session(&self, user_id: UserId, session_id: SessionId)
        -> anyhow::Result<()>;

    /// Forget every entry of the user.
    async fn invalidate_all_for_user(&self, user_id: UserId) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    token_id: TokenId,
    expires_at: OffsetDateTime,
}

/// An [AllowlistCache] in process memory, with per-entry expiry.
pub struct InMemoryAllowlist {
    entries: RwLock<FnvHashMap<UserId, FnvHashMap<SessionId, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAllowlist {
    /// An empty allowlist that reads time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Default::default(),
            clock,
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut purged = 0;

        entries.retain(|_, sessions| {
            let before = sessions.len();
            sessions.retain(|_, entry| entry.expires_at > now);
            purged += before - sessions.len();
            !sessions.is_empty()
        });

        purged
    }
}

#[async_trait]
impl AllowlistCache for InMemoryAllowlist {
    async fn allow(
        &self,
        user_id: UserId,
        session_id: SessionId,
        token_id: TokenId,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let expires_at = self
            .clock
            .now()
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("allowlist expiry out of range"))?;
        self.entries
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(
                session_id,
                Entry {
                    token_id,
                    expires_at,
                },
            );

        Ok(())
    }

    async fn is_valid(
        &self,
        user_id: UserId,
        session_id: SessionId,
        token_id: TokenId,
    ) -> anyhow::Result<bool> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        Ok(entries
            .get(&user_id)
            .and_then(|sessions| sessions.get(&session_id))
            .is_some_and(|entry| entry.token_id == token_id && entry.expires_at > now))
    }

    async fn invalidate_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(sessions) = entries.get_mut(&user_id) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                entries.remove(&user_id);
            }
        }

        Ok(())
    }

    async fn invalidate_all_for_user(&self, user_id: UserId) -> anyhow::Result<()> {
        self.entries.write().await.remove(&user_id);
        Ok(())
    }
}
