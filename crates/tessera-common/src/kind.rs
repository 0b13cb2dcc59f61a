//! Token kinds and their purpose namespaces.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The kinds of tokens issued by Tessera.
///
/// Every kind signs under its own purpose string, so tokens are never
/// interchangeable across kinds even when their claims happen to be compatible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived credential authorizing API calls.
    Access,

    /// Long-lived credential bound to one session, used to mint access tokens.
    Refresh,

    /// Proof of a recent re-authentication.
    StepUp,

    /// Password verified, second factor pending.
    TwoFactorAuthentication,

    /// Pending TOTP enrollment material.
    TotpSetup,

    /// OAuth2 CSRF state and redirect binding.
    #[serde(rename = "oauth2_state")]
    OAuth2State,

    /// Intent to link an OAuth2 identity to a logged-in account.
    #[serde(rename = "oauth2_provider_connection")]
    OAuth2ProviderConnection,
}

impl TokenKind {
    /// All token kinds.
    pub const ALL: [TokenKind; 7] = [
        TokenKind::Access,
        TokenKind::Refresh,
        TokenKind::StepUp,
        TokenKind::TwoFactorAuthentication,
        TokenKind::TotpSetup,
        TokenKind::OAuth2State,
        TokenKind::OAuth2ProviderConnection,
    ];

    /// The purpose string the kind is signed under.
    pub const fn purpose(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::StepUp => "step_up",
            Self::TwoFactorAuthentication => "two_factor_authentication",
            Self::TotpSetup => "totp_setup",
            Self::OAuth2State => "oauth2_state",
            Self::OAuth2ProviderConnection => "oauth2_provider_connection",
        }
    }

    /// Look up a kind by its purpose string.
    pub fn from_purpose(purpose: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.purpose() == purpose)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::StepUp => "step-up",
            Self::TwoFactorAuthentication => "two-factor authentication",
            Self::TotpSetup => "TOTP setup",
            Self::OAuth2State => "OAuth2 state",
            Self::OAuth2ProviderConnection => "OAuth2 provider connection",
        };
        f.write_str(label)
    }
}

#[test]
fn purposes_are_distinct() {
    for kind in TokenKind::ALL {
        assert_eq!(Some(kind), TokenKind::from_purpose(kind.purpose()));
    }
}
