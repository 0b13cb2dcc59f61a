//! The user aggregate as seen by the token services.
//!
//! Persistence of the aggregate is external; these types are what a user store
//! hands to Tessera and receives back for saving.

use std::{collections::BTreeMap, net::IpAddr};

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id::{SessionId, TokenId, UserId};

/// A role granted to a user.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A regular user.
    User,

    /// An administrator. Satisfies every group membership requirement.
    Admin,
}

/// Approximate location of a client, as resolved from its IP address.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// City name, if the resolver knows it.
    #[serde(default)]
    pub city: Option<String>,

    /// ISO 3166-1 alpha-2 country code.
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Device information supplied by the client when a session is created or refreshed.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Browser name and version, e.g. `Firefox 128`.
    #[serde(default)]
    pub browser: Option<String>,

    /// Operating system name.
    #[serde(default)]
    pub os: Option<String>,
}

/// A logged-in device or browser.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Session {
    /// The id of the only refresh token that is currently valid for this session.
    pub refresh_token_id: TokenId,

    /// Browser as reported on the last refresh.
    #[serde(default)]
    pub browser: Option<String>,

    /// Operating system as reported on the last refresh.
    #[serde(default)]
    pub os: Option<String>,

    /// When the current refresh token was issued.
    #[serde(with = "time::serde::timestamp")]
    pub issued_at: OffsetDateTime,

    /// Client address seen on the last refresh.
    #[serde(default)]
    pub ip_address: Option<IpAddr>,

    /// Resolved location of `ip_address`.
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

/// Enabled TOTP second factor.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TotpEnrollment {
    /// Base32-encoded shared secret.
    pub secret: String,

    /// SHA-256 hashes of the unused recovery codes.
    pub recovery_code_hashes: Vec<String>,
}

/// An email one-time code that was sent and not yet used.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PendingEmailCode {
    /// SHA-256 hash of the code, bound to the user id.
    pub code_hash: String,

    /// The code is rejected from this instant on.
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
}

/// A two-factor authentication token that was already exchanged for a session.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ConsumedLoginToken {
    /// The `jti` of the exchanged token.
    pub token_id: TokenId,

    /// The token's own expiry. The entry is dropped after it.
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
}

/// Second factor state of a user.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TwoFactorState {
    /// The TOTP enrollment, if TOTP is enabled.
    #[serde(default)]
    pub totp: Option<TotpEnrollment>,

    /// Whether one-time codes sent by email are accepted as second factor.
    #[serde(default)]
    pub email_enabled: bool,

    /// The last email code sent, until it is used or replaced.
    #[serde(default)]
    pub pending_email_code: Option<PendingEmailCode>,

    /// Two-factor authentication tokens that were exchanged and have not expired yet.
    #[serde(default)]
    pub consumed_login_tokens: Vec<ConsumedLoginToken>,
}

impl TwoFactorState {
    /// Whether a login must pass a second factor.
    pub fn is_enabled(&self) -> bool {
        self.totp.is_some() || self.email_enabled
    }

    /// Whether the two-factor authentication token `token_id` was already exchanged.
    pub fn is_login_token_consumed(&self, token_id: TokenId) -> bool {
        self.consumed_login_tokens
            .iter()
            .any(|consumed| consumed.token_id == token_id)
    }

    /// Record the exchange of a two-factor authentication token.
    ///
    /// Entries whose token has expired by `now` are dropped, since the codec rejects
    /// those tokens anyway.
    pub fn consume_login_token(
        &mut self,
        token_id: TokenId,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) {
        self.consumed_login_tokens
            .retain(|consumed| consumed.expires_at > now);
        self.consumed_login_tokens.push(ConsumedLoginToken {
            token_id,
            expires_at,
        });
    }
}

/// An external identity linked to the user.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IdentityProvider {
    /// The provider key, e.g. `github`.
    pub provider: String,

    /// The user's id at the provider.
    pub subject: String,

    /// When the link was made.
    #[serde(with = "time::serde::timestamp")]
    pub linked_at: OffsetDateTime,
}

/// The user aggregate.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct User {
    /// The user id.
    pub id: UserId,

    /// Address for codes and security alerts.
    pub email: String,

    /// Granted roles. Read from the store on every role check.
    #[serde(default)]
    pub roles: FnvHashSet<Role>,

    /// Keys of the groups the user is a member of.
    #[serde(default)]
    pub groups: FnvHashSet<String>,

    /// Active sessions by id.
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, Session>,

    /// Second factor enrollment.
    #[serde(default)]
    pub two_factor: TwoFactorState,

    /// Linked OAuth2 identities.
    #[serde(default)]
    pub identity_providers: Vec<IdentityProvider>,

    /// Opaque password hash. Hashing happens outside Tessera.
    #[serde(default)]
    pub password_hash: Option<String>,

    /// Preferred locale for notifications.
    #[serde(default)]
    pub locale: Option<String>,
}

impl User {
    /// A new user with the [Role::User] role and no sessions.
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            roles: FnvHashSet::from_iter([Role::User]),
            groups: Default::default(),
            sessions: Default::default(),
            two_factor: Default::default(),
            identity_providers: vec![],
            password_hash: None,
            locale: None,
        }
    }

    /// Look up a session.
    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    /// Insert or replace the session.
    pub fn add_or_update_session(&mut self, session_id: SessionId, session: Session) {
        self.sessions.insert(session_id, session);
    }

    /// Remove a session, returning it if it existed.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    /// Remove every session.
    pub fn clear_sessions(&mut self) {
        self.sessions.clear();
    }

    /// Whether the user holds `role`.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Group membership check. Administrators are members of every group.
    pub fn is_member_of(&self, group_key: &str) -> bool {
        self.has_role(Role::Admin) || self.groups.contains(group_key)
    }

    /// The linked identity at `provider`, if any.
    pub fn identity_provider(&self, provider: &str) -> Option<&IdentityProvider> {
        self.identity_providers
            .iter()
            .find(|link| link.provider == provider)
    }
}
