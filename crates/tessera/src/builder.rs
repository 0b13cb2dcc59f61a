use std::sync::Arc;

use crate::{
    allowlist::{AllowlistCache, InMemoryAllowlist},
    clock::{Clock, SystemClock},
    codec::TokenCodec,
    config::{ConfigError, TokenConfig},
    extract::TokenValueExtractor,
    keys::{InMemoryKeyProvider, SigningKeyProvider},
    store::{GeoResolver, MailSender, UserStore},
    Services, Shared,
};

/// Errors from [ServicesBuilder::build].
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No [UserStore] was given.
    #[error("user store unconfigured")]
    MissingUserStore,
}

/// A builder for configuring [Services].
///
/// Only the user store is mandatory. Without explicit choices, the builder uses the
/// system clock, an in-memory allowlist and an in-memory key ring with a fresh key.
#[derive(Default)]
pub struct ServicesBuilder {
    config: TokenConfig,
    clock: Option<Arc<dyn Clock>>,
    keys: Option<Arc<dyn SigningKeyProvider>>,
    allowlist: Option<Arc<dyn AllowlistCache>>,
    users: Option<Arc<dyn UserStore>>,
    mail: Option<Arc<dyn MailSender>>,
    geo: Option<Arc<dyn GeoResolver>>,
}

impl ServicesBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration instead of the defaults.
    pub fn with_config(mut self, config: TokenConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an externally managed key provider.
    pub fn with_keys(mut self, keys: Arc<dyn SigningKeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Use a shared allowlist cache.
    pub fn with_allowlist(mut self, allowlist: Arc<dyn AllowlistCache>) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    /// Set the user store. Required.
    pub fn with_user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    /// Enables email second factor codes and security notifications.
    pub fn with_mail_sender(mut self, mail: Arc<dyn MailSender>) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Enables session geolocation.
    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Validate the configuration and assemble the services.
    pub fn build(self) -> Result<Services, BuildError> {
        self.config.validate()?;

        let users = self.users.ok_or(BuildError::MissingUserStore)?;
        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let keys = self.keys.unwrap_or_else(|| {
            Arc::new(InMemoryKeyProvider::generate(
                config.key_retention,
                clock.clone(),
            ))
        });
        let allowlist = self
            .allowlist
            .unwrap_or_else(|| Arc::new(InMemoryAllowlist::new(clock.clone())));

        Ok(Services {
            shared: Arc::new(Shared {
                codec: TokenCodec::new(keys.clone(), clock.clone()),
                extractor: TokenValueExtractor::new(config.clone()),
                config,
                clock,
                keys,
                allowlist,
                users,
                mail: self.mail,
                geo: self.geo,
            }),
        })
    }
}
