//! `tessera` is the token lifecycle core of a web API: it issues, validates and
//! revokes access, refresh, step-up, two-factor and OAuth2 linking tokens as signed
//! stateless JWTs, with a server-side revocation overlay.
//!
//! All services hang off a cloneable [Services] handle built with [ServicesBuilder].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

pub use builder::{BuildError, ServicesBuilder};
pub use error::{AuthError, CreateError, FlowError, KeyError, SignError, TokenError, VerifyError};
pub use tessera_common as common;

/// Access tokens.
pub mod access;

/// The access token allowlist.
pub mod allowlist;

/// Per-request authorization and session management.
pub mod authorization;

/// Time source.
pub mod clock;

/// Signing and verification.
pub mod codec;

/// Configuration.
pub mod config;

/// `Set-Cookie` helpers.
pub mod cookie;

/// Token value extraction from requests.
pub mod extract;

/// Multi-step authentication flows.
pub mod flow;

/// Signing keys.
pub mod keys;

/// Refresh tokens and sessions.
pub mod refresh;

/// Step-up tokens.
pub mod step_up;

/// Collaborator interfaces.
pub mod store;

/// Two-factor, TOTP setup and OAuth2 tokens.
pub mod two_factor;

mod builder;
mod error;

use access::AccessTokenService;
use allowlist::AllowlistCache;
use authorization::Authorization;
use clock::Clock;
use codec::TokenCodec;
use config::TokenConfig;
use cookie::Cookies;
use extract::TokenValueExtractor;
use flow::Flows;
use keys::SigningKeyProvider;
use refresh::RefreshTokenService;
use step_up::StepUpTokenService;
use store::{GeoResolver, MailSender, UserStore};
use two_factor::{
    OAuth2ProviderConnectionTokenService, OAuth2StateTokenService,
    TotpSetupTokenService, TwoFactorAuthenticationTokenService,
};

/// The handle to all token services.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Services {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub config: Arc<TokenConfig>,
    pub clock: Arc<dyn Clock>,
    pub keys: Arc<dyn SigningKeyProvider>,
    pub codec: TokenCodec,
    pub extractor: TokenValueExtractor,
    pub allowlist: Arc<dyn AllowlistCache>,
    pub users: Arc<dyn UserStore>,
    pub mail: Option<Arc<dyn MailSender>>,
    pub geo: Option<Arc<dyn GeoResolver>>,
}

impl Services {
    /// Construct a new builder.
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &TokenConfig {
        &self.shared.config
    }

    /// The signing key provider, e.g. for scheduled rotation.
    pub fn keys(&self) -> &Arc<dyn SigningKeyProvider> {
        &self.shared.keys
    }

    /// The token codec.
    pub fn codec(&self) -> &TokenCodec {
        &self.shared.codec
    }

    /// The token value extractor.
    pub fn extractor(&self) -> &TokenValueExtractor {
        &self.shared.extractor
    }

    /// Access token service.
    pub fn access(&self) -> AccessTokenService {
        AccessTokenService::new(self.shared.clone())
    }

    /// Refresh token service.
    pub fn refresh(&self) -> RefreshTokenService {
        RefreshTokenService::new(self.shared.clone())
    }

    /// Step-up token service.
    pub fn step_up(&self) -> StepUpTokenService {
        StepUpTokenService::new(self.shared.clone())
    }

    /// Two-factor authentication token service.
    pub fn two_factor_authentication(&self) -> TwoFactorAuthenticationTokenService {
        TwoFactorAuthenticationTokenService::new(self.shared.clone())
    }

    /// TOTP setup token service.
    pub fn totp_setup(&self) -> TotpSetupTokenService {
        TotpSetupTokenService::new(self.shared.clone())
    }

    /// OAuth2 state token service.
    pub fn oauth2_state(&self) -> OAuth2StateTokenService {
        OAuth2StateTokenService::new(self.shared.clone())
    }

    /// OAuth2 provider connection token service.
    pub fn oauth2_provider_connection(&self) -> OAuth2ProviderConnectionTokenService {
        OAuth2ProviderConnectionTokenService::new(self.shared.clone())
    }

    /// Per-request authorization facade.
    pub fn authorization(&self) -> Authorization {
        Authorization::new(self.shared.clone())
    }

    /// Multi-step authentication flows.
    pub fn flows(&self) -> Flows {
        Flows::new(self.shared.clone())
    }

    /// `Set-Cookie` builders.
    pub fn cookies(&self) -> Cookies {
        Cookies::new(self.shared.config.clone())
    }
}
