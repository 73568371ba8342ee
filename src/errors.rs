//! Authwarden error types.

use thiserror::Error;

/// Errors raised while authenticating, rate limiting, or license gating a request.
#[derive(Debug, Clone, Error)]
pub enum AuthwardenError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No `Authorization` header on the request.
    #[error("Authorization header missing")]
    HeaderMissing,

    /// `Authorization` header present but not `Bearer <token>`.
    #[error("Authorization header is not a bearer credential")]
    HeaderMalformed,

    /// Token declares a signing algorithm outside the RSA family.
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token could not be decoded or lacks a required claim.
    #[error("Malformed token: {0}")]
    TokenMalformed(String),

    /// Token signature does not verify against the published key.
    #[error("Token signature verification failed")]
    SignatureInvalid,

    /// Token names a key id that the key set does not contain.
    #[error("No signing key found for kid {kid:?}")]
    KeyNotFound {
        /// The key id from the token header (empty when absent).
        kid: String,
    },

    /// Token issuer differs from the pinned issuer.
    #[error("Token issuer mismatch (expected {expected}, got {actual})")]
    IssuerMismatch {
        /// Issuer this service trusts.
        expected: String,
        /// Issuer claimed by the token.
        actual: String,
    },

    /// Token `exp` has passed.
    #[error("Token expired")]
    TokenExpired,

    /// Token `nbf` lies in the future.
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Remote key set could not be fetched or decoded.
    #[error("Key set fetch failed: {0}")]
    KeySetFetch(String),

    /// Login body carried no usable `username`.
    #[error("Login request is missing a username")]
    MissingIdentity,

    /// Login body is not the expected JSON shape.
    #[error("Malformed login request: {0}")]
    MalformedLoginBody(String),

    /// Identity is locked out after repeated failures.
    #[error("Too many failed login attempts, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the identity may retry.
        retry_after_secs: u64,
    },

    /// Identity provider rejected the supplied credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// HTTP transport error talking to the identity provider.
    #[error("Identity provider transport error: {0}")]
    IdentityProviderTransport(String),

    /// License gate is closed.
    #[error("License is not unlocked")]
    LicenseLocked,

    /// License block could not be read from disk.
    #[error("License I/O error: {0}")]
    LicenseIO(String),

    /// License block failed integrity checks. Fatal at startup.
    #[error("License tamper detected: {reason}")]
    LicenseTamperDetected {
        /// What failed.
        reason: String,
    },

    /// Unexpected internal failure (worker panicked, runtime gone).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthwardenError {
    /// Build a tamper error from any displayable reason.
    pub fn tamper(reason: impl Into<String>) -> Self {
        Self::LicenseTamperDetected {
            reason: reason.into(),
        }
    }

    /// Whether this failure came from bearer-token verification.
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            Self::HeaderMissing
                | Self::HeaderMalformed
                | Self::UnsupportedAlgorithm(_)
                | Self::TokenMalformed(_)
                | Self::SignatureInvalid
                | Self::KeyNotFound { .. }
                | Self::IssuerMismatch { .. }
                | Self::TokenExpired
                | Self::TokenNotYetValid
                | Self::KeySetFetch(_)
        )
    }

    /// Whether the failure hints at a forged or cross-realm token rather than a stale one.
    pub fn is_suspected_forgery(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::IssuerMismatch { .. })
    }

    /// Seconds the caller should wait before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// HTTP status code for this error at the service boundary.
    ///
    /// All token failures map to 401; forgery suspicion is surfaced through
    /// audit events instead of a distinct status.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::HeaderMissing
            | Self::HeaderMalformed
            | Self::UnsupportedAlgorithm(_)
            | Self::TokenMalformed(_)
            | Self::SignatureInvalid
            | Self::KeyNotFound { .. }
            | Self::IssuerMismatch { .. }
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::KeySetFetch(_)
            | Self::InvalidCredentials => 401,
            Self::MissingIdentity | Self::MalformedLoginBody(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::LicenseLocked | Self::LicenseTamperDetected { .. } => 403,
            Self::IdentityProviderTransport(_) => 502,
            Self::ConfigError(_) | Self::LicenseIO(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::HeaderMissing => "missing_auth_header",
            Self::HeaderMalformed => "invalid_auth_format",
            Self::UnsupportedAlgorithm(_)
            | Self::TokenMalformed(_)
            | Self::SignatureInvalid
            | Self::KeyNotFound { .. }
            | Self::IssuerMismatch { .. }
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::KeySetFetch(_) => "invalid_token",
            Self::MissingIdentity => "missing_username",
            Self::MalformedLoginBody(_) => "invalid_login_body",
            Self::RateLimited { .. } => "login_rate_limited",
            Self::InvalidCredentials => "auth_failed",
            Self::IdentityProviderTransport(_) => "identity_provider_unavailable",
            Self::LicenseLocked => "license_locked",
            Self::LicenseTamperDetected { .. } => "license_tampered",
            Self::ConfigError(_) | Self::LicenseIO(_) | Self::Internal(_) => "internal_error",
        }
    }
}
