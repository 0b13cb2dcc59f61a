use http::StatusCode;
use tessera_common::{kind::TokenKind, user::Role};

/// Errors from verifying a signed token string.
///
/// Reasons are static so that neither token contents nor key material end up in messages.
#[derive(thiserror::Error, Clone, Copy, PartialEq, Eq, Debug)]
pub enum VerifyError {
    /// Empty input.
    #[error("token missing")]
    Missing,

    /// Malformed input, signature mismatch, unknown key or wrong purpose.
    #[error("invalid token: {0}")]
    Invalid(&'static str),

    /// Valid signature, but `exp` has passed.
    #[error("token expired")]
    Expired,
}

/// Errors from signing a claims set.
#[derive(thiserror::Error, Debug)]
pub enum SignError {
    /// The claims could not be serialized.
    #[error("claims encoding error: {0}")]
    Encoding(anyhow::Error),

    /// No signing key is available.
    #[error("signing secret unavailable: {0}")]
    Secret(&'static str),
}

/// Errors from the signing key provider.
#[derive(thiserror::Error, Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyError {
    /// No key with the requested id.
    #[error("signing key not found")]
    NotFound,

    /// No current key could be obtained.
    #[error("signing key unavailable")]
    Unavailable,

    /// The current key is always kept.
    #[error("the current signing key cannot be retired")]
    RetireCurrent,
}

/// Errors from extracting and validating a token of a specific kind.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TokenError {
    /// No credential present.
    #[error("{0} token missing")]
    Missing(TokenKind),

    /// Malformed, wrongly signed, wrong purpose, or inconsistent with server-side state.
    #[error("invalid {0} token: {1}")]
    Invalid(TokenKind, &'static str),

    /// Expired, or (for access tokens) no longer allowlisted.
    #[error("{0} token expired")]
    Expired(TokenKind),

    /// The user store failed.
    #[error("user store error: {0}")]
    Store(anyhow::Error),

    /// The allowlist cache failed.
    #[error("allowlist cache error: {0}")]
    Cache(anyhow::Error),
}

impl TokenError {
    pub(crate) fn from_verify(kind: TokenKind, err: VerifyError) -> Self {
        match err {
            VerifyError::Missing => Self::Missing(kind),
            VerifyError::Invalid(reason) => Self::Invalid(kind, reason),
            VerifyError::Expired => Self::Expired(kind),
        }
    }

    /// The HTTP status a controller should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Missing(_) | Self::Invalid(..) | Self::Expired(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) | Self::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Errors from minting a token.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CreateError {
    /// The claims could not be serialized.
    #[error("claims encoding error: {0}")]
    Encoding(anyhow::Error),

    /// No signing key is available.
    #[error("signing secret unavailable: {0}")]
    Secret(&'static str),

    /// The token may not be minted in this context.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The user store failed.
    #[error("user store error: {0}")]
    Store(anyhow::Error),

    /// The allowlist cache failed.
    #[error("allowlist cache error: {0}")]
    Cache(anyhow::Error),
}

impl From<SignError> for CreateError {
    fn from(value: SignError) -> Self {
        match value {
            SignError::Encoding(err) => Self::Encoding(err),
            SignError::Secret(reason) => Self::Secret(reason),
        }
    }
}

impl CreateError {
    /// The HTTP status a controller should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Store(_) | Self::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Encoding(_) | Self::Secret(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors surfaced by the per-request authorization facade.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The request carries no valid access token.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The current user lacks a role.
    #[error("role required: {0:?}")]
    RoleRequired(Role),

    /// The current user is not a member of a group.
    #[error("group membership required: {0}")]
    GroupMembershipRequired(String),

    /// No valid step-up token for the current session.
    #[error("step-up required: {0}")]
    StepUpRequired(TokenError),

    /// The referenced session does not exist on the current user.
    #[error("session not found")]
    SessionNotFound,

    /// The user store or allowlist failed.
    #[error("infrastructure error: {0}")]
    Infrastructure(anyhow::Error),
}

impl AuthError {
    /// The HTTP status a controller should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired | Self::StepUpRequired(_) => StatusCode::UNAUTHORIZED,
            Self::RoleRequired(_) | Self::GroupMembershipRequired(_) => StatusCode::FORBIDDEN,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// A stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::RoleRequired(_) => "ROLE_REQUIRED",
            Self::GroupMembershipRequired(_) => "GROUP_MEMBERSHIP_REQUIRED",
            Self::StepUpRequired(_) => "SESSION_EXPIRED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Infrastructure(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Errors from the multi-step authentication flows.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum FlowError {
    /// A presented token failed validation.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Minting a token failed.
    #[error(transparent)]
    Create(#[from] CreateError),

    /// The caller is not authorized.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A TOTP, email or recovery code did not verify.
    #[error("invalid code")]
    InvalidCode,

    /// The operation conflicts with the user's current state.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// The user referenced by a flow no longer exists.
    #[error("user not found")]
    UserNotFound,

    /// The user store failed.
    #[error("user store error: {0}")]
    Store(anyhow::Error),

    /// Sending mail failed.
    ///
    /// For email codes the new code is stored before sending, so it replaces the
    /// previous one even when this is returned.
    #[error("mail error: {0}")]
    Mail(anyhow::Error),

    /// The primary state change was committed, but a follow-up side effect failed.
    #[error("state committed, side effect failed: {0}")]
    PostCommitSideEffect(anyhow::Error),
}

impl FlowError {
    /// The HTTP status a controller should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Token(err) => err.status(),
            Self::Create(err) => err.status(),
            Self::Auth(err) => err.status(),
            Self::InvalidCode => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Mail(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PostCommitSideEffect(_) => StatusCode::OK,
        }
    }
}

pub(crate) fn encoding(err: impl std::error::Error + Send + Sync + 'static) -> SignError {
    SignError::Encoding(anyhow::Error::from(err))
}
