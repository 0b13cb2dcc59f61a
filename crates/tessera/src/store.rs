//! Collaborator interfaces: user persistence, mail and geolocation.

use std::net::IpAddr;

use async_trait::async_trait;
use fnv::FnvHashMap;
use tessera_common::{
    id::UserId,
    user::{GeoLocation, User},
};
use tokio::sync::RwLock;

/// Persistence of user aggregates.
///
/// `save` must write the whole aggregate atomically, so that a session's
/// `refresh_token_id` is replaced in one step.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user by id.
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>>;

    /// Load a user by email address, compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Persist the aggregate, returning the stored version.
    async fn save(&self, user: User) -> anyhow::Result<User>;
}

/// Outbound email.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Send an HTML email, localized to `locale` where supported.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        locale: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// IP geolocation. Failures are never fatal to the caller.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolve the approximate location of `ip`.
    async fn resolve(&self, ip: IpAddr) -> anyhow::Result<GeoLocation>;
}

/// A [UserStore] in process memory.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<FnvHashMap<UserId, User>>,
}

impl InMemoryUserStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Whether no user is stored.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn save(&self, user: User) -> anyhow::Result<User> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(user)
    }
}
