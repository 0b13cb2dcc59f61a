//! The per-request view of who is calling, and the session operations that
//! apply to the caller.

use std::sync::Arc;

use tessera_common::{
    id::{SessionId, TokenId, UserId},
    user::{Role, Session, User},
};
use tracing::info;

use crate::{
    access::{AccessToken, AccessTokenService, AuthenticationOutcome},
    error::{AuthError, TokenError},
    extract::RequestContext,
    step_up::{StepUpToken, StepUpTokenService},
    Shared,
};

/// A request together with its authentication result.
///
/// Built once per request by [Authorization::authenticate] and passed explicitly
/// to everything that needs to know the caller.
#[derive(Clone, Debug)]
pub struct AuthContext {
    request: RequestContext,
    outcome: AuthenticationOutcome,
}

impl AuthContext {
    /// The request this context was resolved from.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Whether and how the request was authenticated.
    pub fn outcome(&self) -> &AuthenticationOutcome {
        &self.outcome
    }

    /// The validated access token.
    pub fn access_token(&self) -> Result<&AccessToken, AuthError> {
        self.outcome.token().ok_or(AuthError::AuthenticationRequired)
    }

    /// Whether the request carries a valid access token.
    pub fn is_authenticated(&self) -> bool {
        self.outcome.token().is_some()
    }
}

/// Authorization facade over the token services and the user store.
#[derive(Clone)]
pub struct Authorization {
    shared: Arc<Shared>,
}

impl Authorization {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Resolve the caller of `request`.
    ///
    /// A request without an access token yields an anonymous context. A presented
    /// token that fails validation is an error, so the client knows to refresh.
    pub async fn authenticate(&self, request: RequestContext) -> Result<AuthContext, TokenError> {
        let outcome = AccessTokenService::new(self.shared.clone())
            .extract(&request, false)
            .await?;
        Ok(AuthContext { request, outcome })
    }

    /// The id of the signed-in user.
    pub fn current_user_id(&self, ctx: &AuthContext) -> Result<UserId, AuthError> {
        Ok(ctx.access_token()?.user_id)
    }

    /// The session of the presented access token.
    pub fn current_session_id(&self, ctx: &AuthContext) -> Result<SessionId, AuthError> {
        Ok(ctx.access_token()?.session_id)
    }

    /// The `jti` of the presented access token.
    pub fn current_token_id(&self, ctx: &AuthContext) -> Result<TokenId, AuthError> {
        Ok(ctx.access_token()?.token_id)
    }

    /// Load the caller's user aggregate.
    ///
    /// A token for a user that no longer exists counts as unauthenticated.
    pub async fn current_user(&self, ctx: &AuthContext) -> Result<User, AuthError> {
        let user_id = self.current_user_id(ctx)?;
        self.shared
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Infrastructure)?
            .ok_or(AuthError::AuthenticationRequired)
    }

    /// Require the caller to currently hold `role`.
    pub async fn require_role(&self, ctx: &AuthContext, role: Role) -> Result<User, AuthError> {
        let user = self.current_user(ctx).await?;
        if !user.has_role(role) {
            return Err(AuthError::RoleRequired(role));
        }
        Ok(user)
    }

    /// Require the caller to be a member of the group `group_key`. Admins pass any group.
    pub async fn require_group_membership(
        &self,
        ctx: &AuthContext,
        group_key: &str,
    ) -> Result<User, AuthError> {
        let user = self.current_user(ctx).await?;
        if !user.is_member_of(group_key) {
            return Err(AuthError::GroupMembershipRequired(group_key.to_string()));
        }
        Ok(user)
    }

    /// Require a step-up token for the caller's user and session.
    pub fn require_step_up(&self, ctx: &AuthContext) -> Result<StepUpToken, AuthError> {
        let token = ctx.access_token()?;
        StepUpTokenService::new(self.shared.clone())
            .extract(ctx.request(), token.user_id, token.session_id)
            .map_err(AuthError::StepUpRequired)
    }

    /// The caller's sessions.
    pub async fn sessions(&self, ctx: &AuthContext) -> Result<Vec<(SessionId, Session)>, AuthError> {
        Ok(self.current_user(ctx).await?.sessions.into_iter().collect())
    }

    /// End one of the caller's sessions and revoke its access token.
    pub async fn delete_session(
        &self,
        ctx: &AuthContext,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        let mut user = self.current_user(ctx).await?;
        if user.remove_session(session_id).is_none() {
            return Err(AuthError::SessionNotFound);
        }

        self.shared
            .allowlist
            .invalidate_session(user.id, session_id)
            .await
            .map_err(AuthError::Infrastructure)?;
        self.shared
            .users
            .save(user.clone())
            .await
            .map_err(AuthError::Infrastructure)?;

        info!(user_id = %user.id, %session_id, "session deleted");
        Ok(())
    }

    /// End every session of the caller, including the current one.
    pub async fn delete_all_sessions(&self, ctx: &AuthContext) -> Result<(), AuthError> {
        let mut user = self.current_user(ctx).await?;
        self.end_all_sessions(&mut user)
            .await
            .map_err(AuthError::Infrastructure)
    }

    /// Revoke all access tokens of `user`, drop its sessions and persist.
    pub(crate) async fn end_all_sessions(&self, user: &mut User) -> anyhow::Result<()> {
        self.shared.allowlist.invalidate_all_for_user(user.id).await?;
        let count = user.sessions.len();
        user.clear_sessions();
        *user = self.shared.users.save(user.clone()).await?;

        info!(user_id = %user.id, count, "all sessions ended");
        Ok(())
    }
}
