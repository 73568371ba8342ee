//! Request-handling order for bearer, license, and login checks.
//!
//! The chain owns the services that used to be process globals: one token
//! verifier, one lockout table, one license gate, one audit sink. HTTP
//! adapters hold it behind an `Arc` and call into it per request.

use crate::audit::{event, AuditEvent, AuditSink};
use crate::client::idp::{IdentityProviderClient, TokenGrant};
use crate::clock::Clock;
use crate::config::AuthwardenConfig;
use crate::license::LicenseGate;
use crate::lockout::{extract_login_identity, LoginAttemptTracker};
use crate::protocol::models::Claims;
use crate::token::{parse_bearer, TokenVerifier};
use crate::AuthwardenError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity recorded for events where none is known.
const ANONYMOUS: &str = "anonymous";

/// Caller details carried into audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Peer address.
    pub source_address: String,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl RequestContext {
    /// Context from raw parts.
    pub fn new(source_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Composed authentication services.
pub struct AuthChain {
    verifier: TokenVerifier,
    tracker: Arc<LoginAttemptTracker>,
    gate: Arc<LicenseGate>,
    audit: Arc<dyn AuditSink>,
    expected_issuer: String,
    clock: Arc<dyn Clock>,
    identity_provider: Option<IdentityProviderClient>,
}

impl AuthChain {
    /// Build every service from configuration.
    ///
    /// The gate is passed in because it is bootstrapped before the chain exists.
    pub fn from_config(
        config: &AuthwardenConfig,
        gate: Arc<LicenseGate>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthwardenError> {
        config.validate()?;

        let verifier = TokenVerifier::from_config(&config.app_name, &config.token, clock.clone())?;
        let tracker = Arc::new(LoginAttemptTracker::new(config.lockout.clone(), clock.clone()));

        let mut chain = Self::from_parts(
            verifier,
            tracker,
            gate,
            audit,
            config.token.expected_issuer.clone(),
            clock,
        );

        if let Some(idp) = &config.identity_provider {
            chain.identity_provider = Some(IdentityProviderClient::new(
                &config.app_name,
                idp.clone(),
                config.token.fetch_timeout,
            )?);
        }

        Ok(chain)
    }

    /// Assemble a chain from already-built services.
    pub fn from_parts(
        verifier: TokenVerifier,
        tracker: Arc<LoginAttemptTracker>,
        gate: Arc<LicenseGate>,
        audit: Arc<dyn AuditSink>,
        expected_issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            tracker,
            gate,
            audit,
            expected_issuer: expected_issuer.into(),
            clock,
            identity_provider: None,
        }
    }

    /// Attach the identity provider used by [`AuthChain::login`].
    pub fn with_identity_provider(mut self, client: IdentityProviderClient) -> Self {
        self.identity_provider = Some(client);
        self
    }

    /// Verify the bearer credential in an `Authorization` header value.
    ///
    /// Blocks on the key-set fetch when the cache is cold.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Claims, AuthwardenError> {
        let token = parse_bearer(authorization).map_err(|e| {
            debug!(source = %ctx.source_address, error = %e, "Bearer credential rejected");
            e
        })?;

        match self.verifier.verify(token, &self.expected_issuer) {
            Ok(claims) => Ok(claims),
            Err(e) => {
                let event_type = if e.is_suspected_forgery() {
                    warn!(
                        source = %ctx.source_address,
                        forgery_suspected = true,
                        error = %e,
                        "Token rejected"
                    );
                    event::TOKEN_FORGERY_SUSPECTED
                } else {
                    debug!(source = %ctx.source_address, error = %e, "Token rejected");
                    event::TOKEN_REJECTED
                };
                self.emit(ANONYMOUS, event_type, ctx);
                Err(e)
            }
        }
    }

    /// Admit the request only when the license gate is open.
    pub fn admit_licensed(&self, ctx: &RequestContext) -> Result<(), AuthwardenError> {
        if self.gate.admit() {
            return Ok(());
        }
        warn!(source = %ctx.source_address, phase = ?self.gate.phase(), "License gate closed");
        self.emit(ANONYMOUS, event::LICENSE_DENIED, ctx);
        Err(AuthwardenError::LicenseLocked)
    }

    /// Pull the login identity from `body` and refuse it while locked.
    ///
    /// # Errors
    /// - `MissingIdentity` - no usable `username`
    /// - `RateLimited` - identity is locked
    pub fn screen_login(&self, body: &[u8], ctx: &RequestContext) -> Result<String, AuthwardenError> {
        let identity = extract_login_identity(body).ok_or(AuthwardenError::MissingIdentity)?;

        if let Err(e) = self.tracker.check(&identity) {
            warn!(identity = %identity, source = %ctx.source_address, "Locked identity attempted login");
            self.emit(&identity, event::LOGIN_LOCKED, ctx);
            return Err(e);
        }

        Ok(identity)
    }

    /// Record a rejected login. Returns `true` when it locked the identity.
    pub fn login_failed(&self, identity: &str, ctx: &RequestContext) -> bool {
        let locked = self.tracker.record_failure(identity);
        self.emit(identity, event::LOGIN_FAILED, ctx);
        if locked {
            self.emit(identity, event::LOGIN_LOCKED, ctx);
        }
        locked
    }

    /// Record a successful login and forget earlier failures.
    pub fn login_succeeded(&self, identity: &str, ctx: &RequestContext) {
        self.tracker.clear(identity);
        self.emit(identity, event::LOGIN, ctx);
    }

    /// Exchange credentials with the identity provider and feed the outcome to the tracker.
    ///
    /// # Errors
    /// - `ConfigError` - no identity provider configured
    /// - `InvalidCredentials` - provider rejected the credentials (counted as a failure)
    /// - `IdentityProviderTransport` - provider unreachable (not counted)
    pub fn login(
        &self,
        identity: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<TokenGrant, AuthwardenError> {
        let idp = self
            .identity_provider
            .as_ref()
            .ok_or_else(|| AuthwardenError::ConfigError("No identity provider configured".into()))?;

        match idp.password_grant(identity, password) {
            Ok(grant) => {
                self.login_succeeded(identity, ctx);
                Ok(grant)
            }
            Err(AuthwardenError::InvalidCredentials) => {
                self.login_failed(identity, ctx);
                Err(AuthwardenError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    fn emit(&self, identity: &str, event_type: &str, ctx: &RequestContext) {
        self.audit.log_event(AuditEvent {
            identity: identity.to_string(),
            event_type: event_type.to_string(),
            source_address: ctx.source_address.clone(),
            user_agent: ctx.user_agent.clone(),
            at: self.clock.now_utc(),
        });
    }

    /// Lockout table.
    pub fn tracker(&self) -> &Arc<LoginAttemptTracker> {
        &self.tracker
    }

    /// License gate.
    pub fn gate(&self) -> &Arc<LicenseGate> {
        &self.gate
    }

    /// Token verifier.
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Issuer tokens must carry.
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// Clock shared by every service.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether [`AuthChain::login`] can reach an identity provider.
    pub fn has_identity_provider(&self) -> bool {
        self.identity_provider.is_some()
    }
}
