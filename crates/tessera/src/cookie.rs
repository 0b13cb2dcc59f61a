use std::sync::Arc;

use http::{header::InvalidHeaderValue, HeaderValue};
use tessera_common::kind::TokenKind;

use crate::config::TokenConfig;

/// Builds `Set-Cookie` values with the configured cookie name and lifetime of each token kind.
#[derive(Clone)]
pub struct Cookies {
    config: Arc<TokenConfig>,
}

impl Cookies {
    pub(crate) fn new(config: Arc<TokenConfig>) -> Self {
        Self { config }
    }

    /// A cookie carrying `value` as the token of `kind`.
    pub fn set_cookie(&self, kind: TokenKind, value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let settings = self.config.kind(kind);
        self.build(&settings.cookie, value, settings.ttl_seconds)
    }

    /// A cookie removing the token of `kind` from the client.
    pub fn clear_cookie(&self, kind: TokenKind) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.config.kind(kind).cookie, "", 0)
    }

    fn build(&self, name: &str, value: &str, max_age: i64) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.config.secure_cookies {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}
