//! Token service configuration.

use fnv::FnvHashSet;
use serde::Deserialize;
use tessera_common::kind::TokenKind;
use time::Duration;

/// Upper bound for every configured lifetime: ten years.
pub const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 3600;

/// Where the token value extractor looks for a token.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// Only cookies.
    Cookie,

    /// Only `Bearer` headers.
    Header,

    /// A `Bearer` header if present, otherwise the cookie.
    #[default]
    PreferHeader,
}

/// How long rotated-out signing keys remain valid for verification.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "policy")]
pub enum KeyRetention {
    /// Rotated keys are never purged.
    #[default]
    Forever,

    /// Keep at most `retired` rotated keys, newest first.
    Count {
        /// Number of rotated keys to keep.
        retired: usize,
    },

    /// Purge rotated keys created more than `seconds` ago.
    MaxAge {
        /// Maximum key age in seconds.
        seconds: i64,
    },
}

/// Settings for one token kind.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct KindConfig {
    /// Lifetime of minted tokens.
    pub ttl_seconds: i64,

    /// Cookie carrying the token.
    pub cookie: String,

    /// Header carrying the token as `Bearer <token>`.
    pub header: String,
}

impl KindConfig {
    fn new(ttl_seconds: i64, cookie: &str, header: &str) -> Self {
        Self {
            ttl_seconds,
            cookie: cookie.to_string(),
            header: header.to_string(),
        }
    }

    /// Token lifetime as a [Duration].
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds)
    }
}

/// TOTP parameters.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TotpConfig {
    /// Issuer shown by authenticator apps.
    pub issuer: String,
    /// Code length.
    pub digits: usize,
    /// Time step in seconds.
    pub step: u64,
    /// Accepted steps of clock drift in each direction.
    pub skew: u8,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Tessera".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
        }
    }
}

/// Configuration of all token services.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TokenConfig {
    /// Where token values are read from.
    pub extraction: ExtractionMode,

    /// Add the `Secure` attribute to cookies.
    pub secure_cookies: bool,

    /// The only request path allowed to mint a step-up token after recovery-code redemption.
    pub recovery_path: String,

    /// Upper bound for a geolocation lookup before it counts as unknown.
    pub geolocation_timeout_ms: u64,

    /// Lifetime of email one-time codes.
    pub email_code_ttl_seconds: i64,

    /// Purge policy for rotated signing keys.
    pub key_retention: KeyRetention,

    /// TOTP parameters.
    pub totp: TotpConfig,

    /// Access tokens.
    pub access: KindConfig,
    /// Refresh tokens.
    pub refresh: KindConfig,
    /// Step-up tokens.
    pub step_up: KindConfig,
    /// Pending second factor tokens.
    pub two_factor_authentication: KindConfig,
    /// TOTP enrollment tokens.
    pub totp_setup: KindConfig,
    /// OAuth2 `state` tokens.
    pub oauth2_state: KindConfig,
    /// OAuth2 identity link tokens.
    pub oauth2_provider_connection: KindConfig,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionMode::default(),
            secure_cookies: true,
            recovery_path: "/api/auth/2fa/recovery".to_string(),
            geolocation_timeout_ms: 2_000,
            email_code_ttl_seconds: 600,
            key_retention: KeyRetention::default(),
            totp: TotpConfig::default(),
            access: KindConfig::new(900, "access_token", "authorization"),
            refresh: KindConfig::new(30 * 24 * 3600, "refresh_token", "x-refresh-token"),
            step_up: KindConfig::new(300, "step_up_token", "x-step-up-token"),
            two_factor_authentication: KindConfig::new(
                300,
                "two_factor_authentication_token",
                "x-two-factor-authentication-token",
            ),
            totp_setup: KindConfig::new(600, "totp_setup_token", "x-totp-setup-token"),
            oauth2_state: KindConfig::new(600, "oauth2_state", "x-oauth2-state"),
            oauth2_provider_connection: KindConfig::new(
                600,
                "oauth2_provider_connection_token",
                "x-oauth2-provider-connection-token",
            ),
        }
    }
}

/// Configuration problems.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two token kinds share a cookie name.
    #[error("cookie name `{0}` is used by more than one token kind")]
    DuplicateCookie(String),

    /// Two token kinds share a header name.
    #[error("header name `{0}` is used by more than one token kind")]
    DuplicateHeader(String),

    /// A header name is not a valid HTTP header name.
    #[error("invalid header name `{0}`")]
    InvalidHeader(String),

    /// A lifetime is zero or negative.
    #[error("{0} token lifetime must be positive")]
    NonPositiveTtl(TokenKind),

    /// A lifetime exceeds [MAX_TTL_SECONDS].
    #[error("{0} token lifetime exceeds the ten year maximum")]
    TtlTooLong(TokenKind),

    /// `email-code-ttl-seconds` is not in `1..=MAX_TTL_SECONDS`.
    #[error("email code lifetime must be positive and at most ten years")]
    InvalidEmailCodeTtl,

    /// `key-retention` max-age is not in `1..=MAX_TTL_SECONDS`.
    #[error("key retention max-age must be positive and at most ten years")]
    InvalidKeyRetention,
}

impl TokenConfig {
    /// Parse and validate a TOML document.
    ///
    /// Missing keys take their default values.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// The settings of a token kind.
    pub fn kind(&self, kind: TokenKind) -> &KindConfig {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::StepUp => &self.step_up,
            TokenKind::TwoFactorAuthentication => &self.two_factor_authentication,
            TokenKind::TotpSetup => &self.totp_setup,
            TokenKind::OAuth2State => &self.oauth2_state,
            TokenKind::OAuth2ProviderConnection => &self.oauth2_provider_connection,
        }
    }

    /// Lifetime of email one-time codes.
    pub fn email_code_ttl(&self) -> Duration {
        Duration::seconds(self.email_code_ttl_seconds)
    }

    /// Geolocation lookup timeout.
    pub fn geolocation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.geolocation_timeout_ms)
    }

    /// Check that cookie and header names are unique per token kind and that lifetimes
    /// are positive and at most [MAX_TTL_SECONDS].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut cookies = FnvHashSet::default();
        let mut headers = FnvHashSet::default();

        for kind in TokenKind::ALL {
            let settings = self.kind(kind);
            if settings.ttl_seconds <= 0 {
                return Err(ConfigError::NonPositiveTtl(kind));
            }
            if settings.ttl_seconds > MAX_TTL_SECONDS {
                return Err(ConfigError::TtlTooLong(kind));
            }
            if !cookies.insert(settings.cookie.as_str()) {
                return Err(ConfigError::DuplicateCookie(settings.cookie.clone()));
            }

            let header = http::HeaderName::from_bytes(settings.header.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(settings.header.clone()))?;
            if !headers.insert(header) {
                return Err(ConfigError::DuplicateHeader(settings.header.clone()));
            }
        }

        if !(1..=MAX_TTL_SECONDS).contains(&self.email_code_ttl_seconds) {
            return Err(ConfigError::InvalidEmailCodeTtl);
        }
        if let KeyRetention::MaxAge { seconds } = self.key_retention {
            if !(1..=MAX_TTL_SECONDS).contains(&seconds) {
                return Err(ConfigError::InvalidKeyRetention);
            }
        }

        Ok(())
    }
}
