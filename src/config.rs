//! Authwarden configuration.
//!
//! Settings come from `AUTHWARDEN_*` environment variables via
//! [`AuthwardenConfig::from_env`]. Every knob except the key-set URL and the
//! pinned issuer has a default.

use crate::AuthwardenError;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable names.
pub mod env {
    /// Application name used in the outbound User-Agent.
    pub const APP_NAME: &str = "AUTHWARDEN_APP_NAME";
    /// Remote signing-key set (JWKS) URL.
    pub const JWKS_URL: &str = "AUTHWARDEN_JWKS_URL";
    /// Issuer that tokens must carry verbatim.
    pub const ISSUER: &str = "AUTHWARDEN_ISSUER";
    /// Optional audience to pin.
    pub const AUDIENCE: &str = "AUTHWARDEN_AUDIENCE";
    /// Clock skew tolerance for `exp`/`nbf`.
    pub const LEEWAY_SECS: &str = "AUTHWARDEN_LEEWAY_SECS";
    /// Timeout on the key-set fetch.
    pub const FETCH_TIMEOUT_SECS: &str = "AUTHWARDEN_FETCH_TIMEOUT_SECS";
    /// Key-set cache TTL; `0` fetches on every verification.
    pub const KEYSET_TTL_SECS: &str = "AUTHWARDEN_KEYSET_TTL_SECS";
    /// How long a failed fetch is remembered.
    pub const KEYSET_NEGATIVE_TTL_SECS: &str = "AUTHWARDEN_KEYSET_NEGATIVE_TTL_SECS";
    /// Minimum spacing of forced refreshes on unknown kids.
    pub const KEYSET_REFRESH_INTERVAL_SECS: &str = "AUTHWARDEN_KEYSET_REFRESH_INTERVAL_SECS";
    /// Failures that trigger a lockout.
    pub const LOGIN_MAX_FAILURES: &str = "AUTHWARDEN_LOGIN_MAX_FAILURES";
    /// Window in which failures accumulate.
    pub const LOGIN_WINDOW_SECS: &str = "AUTHWARDEN_LOGIN_WINDOW_SECS";
    /// Lockout duration.
    pub const LOGIN_LOCKOUT_SECS: &str = "AUTHWARDEN_LOGIN_LOCKOUT_SECS";
    /// Retry-After reported for identities without a record.
    pub const LOGIN_DEFAULT_RETRY_SECS: &str = "AUTHWARDEN_LOGIN_DEFAULT_RETRY_SECS";
    /// Interval between sweeps of stale attempt records.
    pub const LOGIN_SWEEP_SECS: &str = "AUTHWARDEN_LOGIN_SWEEP_SECS";
    /// License block location.
    pub const LICENSE_PATH: &str = "AUTHWARDEN_LICENSE_PATH";
    /// `ed25519` or `stub`.
    pub const LICENSE_VERIFIER: &str = "AUTHWARDEN_LICENSE_VERIFIER";
    /// Hex Ed25519 public key for license signatures.
    pub const LICENSE_PUBLIC_KEY: &str = "AUTHWARDEN_LICENSE_PUBLIC_KEY";
    /// Identifier of this device.
    pub const DEVICE_ID: &str = "AUTHWARDEN_DEVICE_ID";
    /// Skip the device binding check.
    pub const ALLOW_MULTI_DEVICE: &str = "AUTHWARDEN_ALLOW_MULTI_DEVICE";
    /// File whose SHA-256 must match the license `engine_hash`.
    pub const ENGINE_PATH: &str = "AUTHWARDEN_ENGINE_PATH";
    /// Polls for the license file before giving up.
    pub const LICENSE_WAIT_ATTEMPTS: &str = "AUTHWARDEN_LICENSE_WAIT_ATTEMPTS";
    /// Delay between license file polls.
    pub const LICENSE_WAIT_INTERVAL_SECS: &str = "AUTHWARDEN_LICENSE_WAIT_INTERVAL_SECS";
    /// OAuth2 token endpoint of the identity provider.
    pub const IDP_TOKEN_URL: &str = "AUTHWARDEN_IDP_TOKEN_URL";
    /// OAuth2 client id.
    pub const IDP_CLIENT_ID: &str = "AUTHWARDEN_IDP_CLIENT_ID";
    /// OAuth2 client secret.
    pub const IDP_CLIENT_SECRET: &str = "AUTHWARDEN_IDP_CLIENT_SECRET";
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct AuthwardenConfig {
    /// Application name (e.g., "acme-portal"), used in the User-Agent.
    pub app_name: String,

    /// Bearer-token verification settings.
    pub token: TokenConfig,

    /// Login lockout policy.
    pub lockout: LockoutPolicy,

    /// License bootstrap settings.
    pub license: LicenseConfig,

    /// Identity provider used by the login route, if any.
    pub identity_provider: Option<IdentityProviderConfig>,
}

/// Bearer-token verification settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// URL of the published JSON Web Key Set.
    pub jwks_url: String,

    /// Issuer that every token must carry, compared byte for byte.
    pub expected_issuer: String,

    /// Audience to require, if any. `None` skips audience checks.
    pub audience: Option<String>,

    /// Clock skew tolerated on `exp` and `nbf`.
    pub leeway: Duration,

    /// Upper bound on one key-set fetch.
    pub fetch_timeout: Duration,

    /// How long a fetched key set is reused. Zero disables caching.
    pub key_set_ttl: Duration,

    /// How long a fetch failure is replayed before trying again.
    pub negative_ttl: Duration,

    /// Minimum time between forced refreshes triggered by unknown kids.
    pub min_refresh_interval: Duration,
}

impl TokenConfig {
    /// Token settings with defaults for everything but the endpoint and issuer.
    pub fn new(jwks_url: impl Into<String>, expected_issuer: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            expected_issuer: expected_issuer.into(),
            audience: None,
            leeway: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(5),
            key_set_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(10),
            min_refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Brute-force lockout policy for the login path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures inside one window that trigger a lockout.
    pub max_failures: u32,

    /// Length of the failure-counting window.
    pub window: Duration,

    /// How long an identity stays locked.
    pub lockout: Duration,

    /// Retry-After reported when an identity has no record.
    pub default_retry_after: Duration,

    /// How often stale records are swept.
    pub sweep_interval: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            window: Duration::from_secs(5 * 60),
            lockout: Duration::from_secs(30 * 60),
            default_retry_after: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Which license signature verifier to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseVerifierKind {
    /// Real Ed25519 verification against a hex-encoded public key.
    Ed25519 {
        /// 64 hex characters.
        public_key_hex: String,
    },
    /// Accepts every signature. Development only.
    Stub,
}

/// License bootstrap settings.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    /// Path of the `<sig>||<payload>` license block.
    pub path: PathBuf,

    /// Signature verifier selection.
    pub verifier: LicenseVerifierKind,

    /// Identifier of the device this process runs on.
    pub device_id: String,

    /// Skip the device binding check.
    pub allow_multi_device: bool,

    /// File fingerprinted against the license `engine_hash`. `None` skips the check.
    pub engine_path: Option<PathBuf>,

    /// Number of polls for the license file at startup.
    pub wait_attempts: u32,

    /// Delay between polls.
    pub wait_interval: Duration,
}

impl LicenseConfig {
    /// Defaults with the given verifier.
    pub fn new(verifier: LicenseVerifierKind) -> Self {
        Self {
            path: default_license_path(),
            verifier,
            device_id: DEFAULT_DEVICE_ID.to_string(),
            allow_multi_device: false,
            engine_path: None,
            wait_attempts: 10,
            wait_interval: Duration::from_secs(2),
        }
    }
}

/// OAuth2 password-grant endpoint used by the login route.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// Token endpoint URL.
    pub token_url: String,

    /// Client id.
    pub client_id: String,

    /// Client secret.
    pub client_secret: String,
}

/// Device id assumed when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "web-default";

/// `<data_dir>/authwarden/unlock.lic`, or `./unlock.lic` when no data dir exists.
pub fn default_license_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("authwarden").join("unlock.lic"))
        .unwrap_or_else(|| PathBuf::from("unlock.lic"))
}

impl AuthwardenConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, AuthwardenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthwardenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: Duration| -> Result<Duration, AuthwardenError> {
            match get(key) {
                Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    AuthwardenError::ConfigError(format!("{} must be whole seconds, got {:?}", key, raw))
                }),
                None => Ok(default),
            }
        };

        let jwks_url = get(env::JWKS_URL)
            .ok_or_else(|| AuthwardenError::ConfigError(format!("{} is required", env::JWKS_URL)))?;
        let issuer = get(env::ISSUER)
            .ok_or_else(|| AuthwardenError::ConfigError(format!("{} is required", env::ISSUER)))?;

        let defaults = TokenConfig::new(jwks_url, issuer);
        let token = TokenConfig {
            audience: get(env::AUDIENCE),
            leeway: secs(env::LEEWAY_SECS, defaults.leeway)?,
            fetch_timeout: secs(env::FETCH_TIMEOUT_SECS, defaults.fetch_timeout)?,
            key_set_ttl: secs(env::KEYSET_TTL_SECS, defaults.key_set_ttl)?,
            negative_ttl: secs(env::KEYSET_NEGATIVE_TTL_SECS, defaults.negative_ttl)?,
            min_refresh_interval: secs(
                env::KEYSET_REFRESH_INTERVAL_SECS,
                defaults.min_refresh_interval,
            )?,
            ..defaults
        };

        let policy = LockoutPolicy::default();
        let max_failures = match get(env::LOGIN_MAX_FAILURES) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                AuthwardenError::ConfigError(format!(
                    "{} must be a positive integer, got {:?}",
                    env::LOGIN_MAX_FAILURES,
                    raw
                ))
            })?,
            None => policy.max_failures,
        };
        let lockout = LockoutPolicy {
            max_failures,
            window: secs(env::LOGIN_WINDOW_SECS, policy.window)?,
            lockout: secs(env::LOGIN_LOCKOUT_SECS, policy.lockout)?,
            default_retry_after: secs(env::LOGIN_DEFAULT_RETRY_SECS, policy.default_retry_after)?,
            sweep_interval: secs(env::LOGIN_SWEEP_SECS, policy.sweep_interval)?,
        };

        let verifier = match get(env::LICENSE_VERIFIER).as_deref() {
            None | Some("ed25519") => LicenseVerifierKind::Ed25519 {
                public_key_hex: get(env::LICENSE_PUBLIC_KEY).unwrap_or_default(),
            },
            Some("stub") => LicenseVerifierKind::Stub,
            Some(other) => {
                return Err(AuthwardenError::ConfigError(format!(
                    "{} must be \"ed25519\" or \"stub\", got {:?}",
                    env::LICENSE_VERIFIER,
                    other
                )))
            }
        };
        let license_defaults = LicenseConfig::new(verifier);
        let wait_attempts = match get(env::LICENSE_WAIT_ATTEMPTS) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                AuthwardenError::ConfigError(format!(
                    "{} must be an integer, got {:?}",
                    env::LICENSE_WAIT_ATTEMPTS,
                    raw
                ))
            })?,
            None => license_defaults.wait_attempts,
        };
        let license = LicenseConfig {
            path: get(env::LICENSE_PATH)
                .map(PathBuf::from)
                .unwrap_or(license_defaults.path.clone()),
            device_id: get(env::DEVICE_ID).unwrap_or(license_defaults.device_id.clone()),
            allow_multi_device: get(env::ALLOW_MULTI_DEVICE)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            engine_path: get(env::ENGINE_PATH).map(PathBuf::from),
            wait_attempts,
            wait_interval: secs(env::LICENSE_WAIT_INTERVAL_SECS, license_defaults.wait_interval)?,
            ..license_defaults
        };

        let identity_provider = match get(env::IDP_TOKEN_URL) {
            Some(token_url) => Some(IdentityProviderConfig {
                token_url,
                client_id: get(env::IDP_CLIENT_ID).unwrap_or_default(),
                client_secret: get(env::IDP_CLIENT_SECRET).unwrap_or_default(),
            }),
            None => None,
        };

        let config = Self {
            app_name: get(env::APP_NAME).unwrap_or_else(|| "authwarden".to_string()),
            token,
            lockout,
            license,
            identity_provider,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), AuthwardenError> {
        let token = &self.token;
        if !(token.jwks_url.starts_with("https://") || token.jwks_url.starts_with("http://")) {
            return Err(AuthwardenError::ConfigError(format!(
                "jwks_url must be an http(s) URL, got {:?}",
                token.jwks_url
            )));
        }
        if token.expected_issuer.is_empty() {
            return Err(AuthwardenError::ConfigError(
                "expected_issuer cannot be empty".to_string(),
            ));
        }
        if token.fetch_timeout.is_zero() {
            return Err(AuthwardenError::ConfigError(
                "fetch_timeout must be non-zero".to_string(),
            ));
        }

        if self.lockout.max_failures == 0 {
            return Err(AuthwardenError::ConfigError(
                "lockout max_failures must be at least 1".to_string(),
            ));
        }
        if self.lockout.window.is_zero() || self.lockout.lockout.is_zero() {
            return Err(AuthwardenError::ConfigError(
                "lockout window and duration must be non-zero".to_string(),
            ));
        }
        if self.lockout.sweep_interval.is_zero() {
            return Err(AuthwardenError::ConfigError(
                "lockout sweep_interval must be non-zero".to_string(),
            ));
        }

        if let LicenseVerifierKind::Ed25519 { public_key_hex } = &self.license.verifier {
            if public_key_hex.len() != 64 {
                return Err(AuthwardenError::ConfigError(format!(
                    "license public key must be 64 hex characters, got {}",
                    public_key_hex.len()
                )));
            }
        }
        if self.license.device_id.is_empty() {
            return Err(AuthwardenError::ConfigError(
                "device_id cannot be empty".to_string(),
            ));
        }

        if let Some(idp) = &self.identity_provider {
            if idp.client_id.is_empty() {
                return Err(AuthwardenError::ConfigError(
                    "identity provider client_id cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
