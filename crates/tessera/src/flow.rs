//! Multi-step authentication flows composed from the token services.
//!
//! Password verification itself happens outside this crate; the flows start
//! from a user whose password has already been checked.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tessera_common::{
    id::{SessionId, UserId},
    kind::TokenKind,
    user::{IdentityProvider, SessionInfo, TotpEnrollment, User},
};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::{
    access::{AccessToken, AccessTokenService},
    authorization::{AuthContext, Authorization},
    codec::expiry,
    error::{CreateError, FlowError, TokenError},
    extract::RequestContext,
    refresh::{RefreshToken, RefreshTokenService},
    step_up::{StepUpToken, StepUpTokenService},
    two_factor::{
        codes, totp, OAuth2ProviderConnection, OAuth2ProviderConnectionTokenService, TotpSetup,
        TotpSetupTokenService, TwoFactorAuthenticationToken, TwoFactorAuthenticationTokenService,
    },
    Shared,
};

/// Tokens handed to a client that just (re-)authenticated.
#[derive(Clone, Debug)]
pub struct TokenBundle {
    /// Access token for the session.
    pub access: AccessToken,
    /// Refresh token for the session.
    pub refresh: RefreshToken,
    /// Step-up token, when the authentication also counts as a re-authentication.
    pub step_up: Option<StepUpToken>,
}

/// The result of a successful password check.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    /// No second factor enrolled: signed in.
    Authenticated(TokenBundle),

    /// A second factor is required before tokens are issued.
    PendingTwoFactor(TwoFactorAuthenticationToken),
}

/// The proof offered to complete a pending two-factor login.
#[derive(Clone, Debug)]
pub enum SecondFactor {
    /// A code from the user's authenticator app.
    Totp(String),
    /// The code from the last login email.
    Email(String),

    /// Only accepted on the configured recovery path.
    RecoveryCode(String),
}

/// The proof offered for a step-up.
#[derive(Clone, Debug)]
pub enum StepUpProof {
    /// The caller re-verified the user's password.
    PasswordVerified,
    /// A code from the user's authenticator app.
    Totp(String),
    /// The code from the last step-up email.
    Email(String),
}

/// The result of a completed TOTP enrollment.
#[derive(Debug)]
pub struct TotpEnabled {
    /// Recovery codes in display form. They are not retrievable later.
    pub recovery_codes: Vec<String>,

    /// Tokens for the fresh session of the enrolling device.
    pub tokens: TokenBundle,
}

#[derive(Clone, Copy)]
enum StepUpGrant {
    None,
    Standard,
    Recovery,
}

/// The multi-step authentication flows.
#[derive(Clone)]
pub struct Flows {
    shared: Arc<Shared>,
}

impl Flows {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Continue a login after the password was verified.
    ///
    /// Users without a second factor get a new session right away. Everyone else
    /// gets a two-factor authentication token to exchange in [Self::complete_two_factor].
    pub async fn after_password_verified(
        &self,
        mut user: User,
        info: &SessionInfo,
        request: &RequestContext,
    ) -> Result<LoginOutcome, FlowError> {
        if user.two_factor.is_enabled() {
            let token = self.two_factor_authentication().create(user.id, None)?;
            info!(user_id = %user.id, "password verified, second factor pending");
            return Ok(LoginOutcome::PendingTwoFactor(token));
        }

        let tokens = self
            .open_session(&mut user, SessionId::random(), info, request, StepUpGrant::None)
            .await?;
        info!(user_id = %user.id, session_id = %tokens.access.session_id, "signed in");

        Ok(LoginOutcome::Authenticated(tokens))
    }

    /// Exchange the two-factor authentication token on `request` and a second factor
    /// for a session with access, refresh and step-up tokens.
    ///
    /// A token is exchanged at most once: the exchange is recorded on the user together
    /// with the new session, and a later attempt with the same token is rejected.
    /// The client should clear its two-factor authentication token afterwards.
    pub async fn complete_two_factor(
        &self,
        request: &RequestContext,
        proof: SecondFactor,
        info: &SessionInfo,
    ) -> Result<TokenBundle, FlowError> {
        let pending = self.two_factor_authentication().extract(request)?;
        let mut user = self.load_user(pending.user_id).await?;
        let user_id = user.id;
        let now = self.shared.clock.now();

        if user.two_factor.is_login_token_consumed(pending.token_id) {
            warn!(%user_id, "two-factor authentication token presented again");
            return Err(TokenError::Invalid(TokenKind::TwoFactorAuthentication, "already used").into());
        }

        let grant = match &proof {
            SecondFactor::Totp(code) => {
                let enrollment = user.two_factor.totp.as_ref().ok_or(FlowError::InvalidCode)?;
                if !totp::verify_code(&self.shared.config.totp, &enrollment.secret, code, now) {
                    return Err(FlowError::InvalidCode);
                }
                StepUpGrant::Standard
            }
            SecondFactor::Email(code) => {
                consume_email_code(&mut user, code, now)?;
                StepUpGrant::Standard
            }
            SecondFactor::RecoveryCode(code) => {
                self.step_up_tokens().ensure_recovery_path(request)?;
                let enrollment = user.two_factor.totp.as_mut().ok_or(FlowError::InvalidCode)?;
                if !codes::redeem_recovery_code(&mut enrollment.recovery_code_hashes, user_id, code)
                {
                    return Err(FlowError::InvalidCode);
                }
                warn!(%user_id, remaining = enrollment.recovery_code_hashes.len(), "recovery code redeemed");
                StepUpGrant::Recovery
            }
        };

        user.two_factor
            .consume_login_token(pending.token_id, pending.expires_at, now);

        let session_id = pending.session_id.unwrap_or_else(SessionId::random);
        let tokens = self
            .open_session(&mut user, session_id, info, request, grant)
            .await?;
        info!(%user_id, %session_id, "second factor verified, signed in");

        Ok(tokens)
    }

    /// Email a login code to the user of the pending two-factor token on `request`.
    pub async fn send_login_email_code(&self, request: &RequestContext) -> Result<(), FlowError> {
        let pending = self.two_factor_authentication().extract(request)?;
        let mut user = self.load_user(pending.user_id).await?;
        self.send_email_code(&mut user).await
    }

    /// Email a step-up code to the caller.
    pub async fn send_step_up_email_code(&self, ctx: &AuthContext) -> Result<(), FlowError> {
        let mut user = self.authorization().current_user(ctx).await?;
        self.send_email_code(&mut user).await
    }

    /// Rotate the refresh token on `request` and issue a new access token for the same session.
    pub async fn refresh(
        &self,
        request: &RequestContext,
        info: &SessionInfo,
    ) -> Result<TokenBundle, FlowError> {
        let (token, mut user) = self.refresh_tokens().extract_with_user(request).await?;
        self.open_session(&mut user, token.session_id, info, request, StepUpGrant::None)
            .await
    }

    /// Prove a recent re-authentication for the caller's session.
    pub async fn step_up(&self, ctx: &AuthContext, proof: StepUpProof) -> Result<StepUpToken, FlowError> {
        let session_id = ctx.access_token()?.session_id;
        let mut user = self.authorization().current_user(ctx).await?;
        let now = self.shared.clock.now();

        match &proof {
            StepUpProof::PasswordVerified => {}
            StepUpProof::Totp(code) => {
                let enrollment = user.two_factor.totp.as_ref().ok_or(FlowError::InvalidCode)?;
                if !totp::verify_code(&self.shared.config.totp, &enrollment.secret, code, now) {
                    return Err(FlowError::InvalidCode);
                }
            }
            StepUpProof::Email(code) => {
                consume_email_code(&mut user, code, now)?;
                user = self.save(user).await?;
            }
        }

        Ok(self.step_up_tokens().create(user.id, session_id)?)
    }

    /// End the caller's current session.
    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), FlowError> {
        let authorization = self.authorization();
        let session_id = authorization.current_session_id(ctx)?;
        authorization.delete_session(ctx, session_id).await?;
        Ok(())
    }

    /// End every session of the caller.
    pub async fn logout_all(&self, ctx: &AuthContext) -> Result<(), FlowError> {
        self.authorization().delete_all_sessions(ctx).await?;
        Ok(())
    }

    /// Start TOTP enrollment. Requires a step-up.
    pub async fn begin_totp_setup(&self, ctx: &AuthContext) -> Result<TotpSetup, FlowError> {
        let authorization = self.authorization();
        authorization.require_step_up(ctx)?;
        let user = authorization.current_user(ctx).await?;

        if user.two_factor.totp.is_some() {
            return Err(FlowError::Conflict("TOTP already enabled"));
        }

        Ok(self.totp_setup().create(&user)?)
    }

    /// Finish TOTP enrollment with the setup token and a first code.
    ///
    /// Enabling TOTP ends every session of the user; the enrolling device continues
    /// in a fresh session.
    pub async fn complete_totp_setup(
        &self,
        ctx: &AuthContext,
        setup_token: &str,
        code: &str,
        info: &SessionInfo,
    ) -> Result<TotpEnabled, FlowError> {
        let authorization = self.authorization();
        let mut user = authorization.current_user(ctx).await?;
        let setup = self.totp_setup().validate(setup_token, user.id)?;

        if user.two_factor.totp.is_some() {
            return Err(FlowError::Conflict("TOTP already enabled"));
        }
        if !setup.verify_code(&self.shared.config.totp, code, self.shared.clock.now()) {
            return Err(FlowError::InvalidCode);
        }

        user.two_factor.totp = Some(TotpEnrollment {
            secret: setup.secret.expose_secret().to_string(),
            recovery_code_hashes: setup
                .recovery_codes
                .iter()
                .filter_map(|code| codes::hash_recovery_code(user.id, code))
                .collect(),
        });
        authorization
            .end_all_sessions(&mut user)
            .await
            .map_err(FlowError::Store)?;
        info!(user_id = %user.id, "TOTP enabled");

        let tokens = self
            .open_session(
                &mut user,
                SessionId::random(),
                info,
                ctx.request(),
                StepUpGrant::Standard,
            )
            .await?;

        Ok(TotpEnabled {
            recovery_codes: setup.recovery_codes,
            tokens,
        })
    }

    /// Remove the TOTP enrollment. Requires a step-up.
    pub async fn disable_totp(&self, ctx: &AuthContext) -> Result<User, FlowError> {
        let authorization = self.authorization();
        authorization.require_step_up(ctx)?;
        let mut user = authorization.current_user(ctx).await?;

        if user.two_factor.totp.take().is_none() {
            return Err(FlowError::Conflict("TOTP not enabled"));
        }

        let user = self.save(user).await?;
        info!(user_id = %user.id, "TOTP disabled");
        Ok(user)
    }

    /// Store a new password hash and end every session of the user, then alert the user.
    ///
    /// The reset is committed before the alert is sent. A failed alert is reported as
    /// [FlowError::PostCommitSideEffect] and does not undo the reset.
    pub async fn reset_password(
        &self,
        user_id: UserId,
        new_password_hash: String,
    ) -> Result<(), FlowError> {
        let mut user = self.load_user(user_id).await?;
        user.password_hash = Some(new_password_hash);
        self.authorization()
            .end_all_sessions(&mut user)
            .await
            .map_err(FlowError::Store)?;
        info!(%user_id, "password reset");

        let Some(mail) = &self.shared.mail else {
            warn!(%user_id, "no mail sender, password reset alert not sent");
            return Ok(());
        };

        mail.send(
            &user.email,
            "Your password was changed",
            "<p>The password of your account was just changed and all devices were signed out.</p>\
             <p>If this was not you, contact support immediately.</p>",
            user.locale.as_deref(),
        )
        .await
        .map_err(|err| {
            error!(?err, %user_id, "password reset alert failed");
            FlowError::PostCommitSideEffect(err)
        })
    }

    /// Start linking an OAuth2 provider to the caller's account.
    pub fn begin_oauth2_connection(
        &self,
        ctx: &AuthContext,
        provider: &str,
    ) -> Result<OAuth2ProviderConnection, FlowError> {
        let access = ctx.access_token()?;
        Ok(self
            .oauth2_provider_connection()
            .create(access.user_id, access.session_id, provider)?)
    }

    /// Finish linking with the provider connection token on the callback `request`
    /// and the subject the provider authenticated.
    pub async fn complete_oauth2_connection(
        &self,
        request: &RequestContext,
        provider_subject: &str,
    ) -> Result<User, FlowError> {
        let (connection, mut user) = self.oauth2_provider_connection().extract(request).await?;

        if user.identity_provider(&connection.provider).is_some() {
            return Err(FlowError::Conflict("provider already linked"));
        }

        user.identity_providers.push(IdentityProvider {
            provider: connection.provider.clone(),
            subject: provider_subject.to_string(),
            linked_at: self.shared.clock.now(),
        });

        let user = self.save(user).await?;
        info!(user_id = %user.id, provider = %connection.provider, "provider linked");
        Ok(user)
    }

    /// Unlink an OAuth2 provider. Requires a step-up.
    pub async fn delete_identity_provider(
        &self,
        ctx: &AuthContext,
        provider: &str,
    ) -> Result<User, FlowError> {
        let authorization = self.authorization();
        authorization.require_step_up(ctx)?;
        let mut user = authorization.current_user(ctx).await?;

        let Some(idx) = user
            .identity_providers
            .iter()
            .position(|linked| linked.provider == provider)
        else {
            return Err(FlowError::Conflict("provider not linked"));
        };
        if user.password_hash.is_none() && user.identity_providers.len() == 1 {
            return Err(FlowError::Conflict("cannot remove the only sign-in method"));
        }

        user.identity_providers.remove(idx);
        let user = self.save(user).await?;
        info!(user_id = %user.id, provider, "provider unlinked");
        Ok(user)
    }

    async fn open_session(
        &self,
        user: &mut User,
        session_id: SessionId,
        info: &SessionInfo,
        request: &RequestContext,
        grant: StepUpGrant,
    ) -> Result<TokenBundle, FlowError> {
        let refresh = self
            .refresh_tokens()
            .create(user, session_id, info, request)
            .await?;
        let access = self.access().create(user, session_id).await?;
        let step_up = match grant {
            StepUpGrant::None => None,
            StepUpGrant::Standard => Some(self.step_up_tokens().create(user.id, session_id)?),
            StepUpGrant::Recovery => {
                Some(self.step_up_tokens().create_for_recovery(user.id, session_id, request)?)
            }
        };

        Ok(TokenBundle {
            access,
            refresh,
            step_up,
        })
    }

    async fn send_email_code(&self, user: &mut User) -> Result<(), FlowError> {
        if !user.two_factor.email_enabled {
            return Err(FlowError::Conflict("email second factor not enabled"));
        }
        let Some(mail) = &self.shared.mail else {
            return Err(FlowError::Mail(anyhow::anyhow!("no mail sender configured")));
        };

        let ttl = self.shared.config.email_code_ttl();
        let code = codes::generate_email_code();
        let expires_at = expiry(self.shared.clock.now(), ttl).map_err(CreateError::from)?;
        user.two_factor.pending_email_code =
            Some(codes::pending_email_code(user.id, &code, expires_at));
        *user = self.save(user.clone()).await?;

        mail.send(
            &user.email,
            "Your verification code",
            &format!(
                "<p>Your verification code is <strong>{code}</strong>.</p>\
                 <p>It expires in {} minutes.</p>",
                ttl.whole_minutes()
            ),
            user.locale.as_deref(),
        )
        .await
        .map_err(FlowError::Mail)
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, FlowError> {
        self.shared
            .users
            .find_by_id(user_id)
            .await
            .map_err(FlowError::Store)?
            .ok_or(FlowError::UserNotFound)
    }

    async fn save(&self, user: User) -> Result<User, FlowError> {
        self.shared.users.save(user).await.map_err(FlowError::Store)
    }

    fn authorization(&self) -> Authorization {
        Authorization::new(self.shared.clone())
    }

    fn access(&self) -> AccessTokenService {
        AccessTokenService::new(self.shared.clone())
    }

    fn refresh_tokens(&self) -> RefreshTokenService {
        RefreshTokenService::new(self.shared.clone())
    }

    fn step_up_tokens(&self) -> StepUpTokenService {
        StepUpTokenService::new(self.shared.clone())
    }

    fn two_factor_authentication(&self) -> TwoFactorAuthenticationTokenService {
        TwoFactorAuthenticationTokenService::new(self.shared.clone())
    }

    fn totp_setup(&self) -> TotpSetupTokenService {
        TotpSetupTokenService::new(self.shared.clone())
    }

    fn oauth2_provider_connection(&self) -> OAuth2ProviderConnectionTokenService {
        OAuth2ProviderConnectionTokenService::new(self.shared.clone())
    }
}

/// Verify and clear the pending email code.
fn consume_email_code(user: &mut User, code: &str, now: OffsetDateTime) -> Result<(), FlowError> {
    if !user.two_factor.email_enabled {
        return Err(FlowError::InvalidCode);
    }
    let valid = user
        .two_factor
        .pending_email_code
        .as_ref()
        .is_some_and(|pending| codes::verify_email_code(pending, user.id, code, now));
    if !valid {
        return Err(FlowError::InvalidCode);
    }

    user.two_factor.pending_email_code = None;
    Ok(())
}

