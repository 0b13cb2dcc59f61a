//! Locating raw token values in inbound requests.

use std::{net::IpAddr, sync::Arc};

use http::{header::COOKIE, HeaderMap};
use tessera_common::kind::TokenKind;
use tracing::debug;

use crate::{
    config::{ExtractionMode, TokenConfig},
    error::TokenError,
};

const BEARER_PREFIX: &str = "Bearer ";

/// The parts of an inbound request the token services look at.
///
/// HTTP glue builds one per request and threads it explicitly through every call.
#[derive(Clone, Default, Debug)]
pub struct RequestContext {
    headers: HeaderMap,
    path: String,
    remote_addr: Option<IpAddr>,
}

impl RequestContext {
    /// A request to `path` without headers.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            headers: HeaderMap::new(),
            path: path.into(),
            remote_addr: None,
        }
    }

    /// Build from the head of an [http::Request].
    pub fn from_parts(parts: &http::request::Parts, remote_addr: Option<IpAddr>) -> Self {
        Self {
            headers: parts.headers.clone(),
            path: parts.uri.path().to_string(),
            remote_addr,
        }
    }

    /// Replace the request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the peer address, used when no forwarding header is present.
    pub fn with_remote_addr(mut self, remote_addr: IpAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request path, without query.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The value of the named cookie, if sent.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// The token in a `Bearer` header with the given name, if sent.
    ///
    /// A header without the `Bearer ` prefix counts as absent.
    pub fn bearer(&self, header: &str) -> Option<&str> {
        let value = self.headers.get(header)?.to_str().ok()?.trim();
        match value.strip_prefix(BEARER_PREFIX) {
            Some(token) => Some(token.trim()).filter(|token| !token.is_empty()),
            None => {
                debug!(header, "ignoring header value without bearer prefix");
                None
            }
        }
    }

    /// The client address: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
    pub fn client_ip(&self) -> Option<IpAddr> {
        let forwarded = self
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }

        self.headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .or(self.remote_addr)
    }
}

/// Finds token values in requests, per token kind, according to [TokenConfig].
#[derive(Clone)]
pub struct TokenValueExtractor {
    config: Arc<TokenConfig>,
}

impl TokenValueExtractor {
    /// An extractor for the cookie and header names in `config`.
    pub fn new(config: Arc<TokenConfig>) -> Self {
        Self { config }
    }

    /// Locate the raw token of `kind`.
    ///
    /// Returns `Ok(None)` when no credential is present and `required` is false,
    /// so anonymous requests can proceed.
    pub fn extract_value(
        &self,
        request: &RequestContext,
        kind: TokenKind,
        required: bool,
    ) -> Result<Option<String>, TokenError> {
        let settings = self.config.kind(kind);

        let value = match self.config.extraction {
            ExtractionMode::Cookie => request.cookie(&settings.cookie),
            ExtractionMode::Header => request.bearer(&settings.header),
            ExtractionMode::PreferHeader => request
                .bearer(&settings.header)
                .or_else(|| request.cookie(&settings.cookie)),
        };

        match value {
            Some(value) => Ok(Some(value.to_string())),
            None if required => Err(TokenError::Missing(kind)),
            None => Ok(None),
        }
    }
}
