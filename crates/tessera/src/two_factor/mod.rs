pub use authentication::{TwoFactorAuthenticationToken, TwoFactorAuthenticationTokenService};
pub use oauth2::{
    OAuth2ProviderConnection, OAuth2ProviderConnectionTokenService, OAuth2State,
    OAuth2StateTokenService,
};
pub use totp::{TotpSetup, TotpSetupToken, TotpSetupTokenService};

/// Recovery and email codes.
pub mod codes;

mod authentication;
mod oauth2;
pub(crate) mod totp;
