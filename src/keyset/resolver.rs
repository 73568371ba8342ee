//! Signing-key set resolution.

use crate::client::http::KeySetClient;
use crate::config::TokenConfig;
use crate::protocol::models::{KeySet, SigningKey};
use crate::AuthwardenError;
use std::sync::Arc;

/// Source of the current signing-key set.
///
/// A failure must be treated as a denial by callers, never as "no auth required".
pub trait KeySetResolver: Send + Sync {
    /// Produce the current key set.
    fn resolve(&self) -> Result<Arc<KeySet>, AuthwardenError>;

    /// Find a key by id. Implementations may refresh on a miss.
    fn lookup(&self, kid: &str) -> Result<Option<SigningKey>, AuthwardenError> {
        Ok(self.resolve()?.get(kid).cloned())
    }
}

impl<R: KeySetResolver + ?Sized> KeySetResolver for Arc<R> {
    fn resolve(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        (**self).resolve()
    }

    fn lookup(&self, kid: &str) -> Result<Option<SigningKey>, AuthwardenError> {
        (**self).lookup(kid)
    }
}

/// Fetches the remote key set on every call.
pub struct RemoteKeySetResolver {
    client: KeySetClient,
}

impl RemoteKeySetResolver {
    /// Create a resolver for the configured endpoint.
    pub fn new(app_name: &str, config: &TokenConfig) -> Result<Self, AuthwardenError> {
        Ok(Self {
            client: KeySetClient::new(app_name, config)?,
        })
    }

    /// Wrap an existing client.
    pub fn with_client(client: KeySetClient) -> Self {
        Self { client }
    }
}

impl KeySetResolver for RemoteKeySetResolver {
    fn resolve(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        self.client.fetch().map(Arc::new)
    }
}

/// Serves a fixed key set.
#[derive(Debug, Clone)]
pub struct StaticKeySetResolver {
    keys: Arc<KeySet>,
}

impl StaticKeySetResolver {
    /// Serve the given keys.
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

impl KeySetResolver for StaticKeySetResolver {
    fn resolve(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        Ok(self.keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> SigningKey {
        SigningKey {
            id: id.to_string(),
            algorithm: "RS256".to_string(),
            modulus: "n".to_string(),
            exponent: "AQAB".to_string(),
        }
    }

    #[test]
    fn static_lookup_hits_and_misses() {
        let resolver = StaticKeySetResolver::new(KeySet::from_keys([key("a"), key("b")]));
        assert_eq!(resolver.lookup("a").unwrap(), Some(key("a")));
        assert_eq!(resolver.lookup("xyz").unwrap(), None);
        assert_eq!(resolver.resolve().unwrap().len(), 2);
    }

    #[test]
    fn arc_forwards() {
        let resolver: Arc<dyn KeySetResolver> =
            Arc::new(StaticKeySetResolver::new(KeySet::from_keys([key("a")])));
        assert!(resolver.lookup("a").unwrap().is_some());
    }

    #[test]
    fn remote_resolver_surfaces_fetch_error() {
        let mut config = TokenConfig::new("http://127.0.0.1:9/certs", "http://idp");
        config.fetch_timeout = std::time::Duration::from_millis(500);
        let resolver = RemoteKeySetResolver::new("test-app", &config).unwrap();
        assert!(matches!(
            resolver.resolve(),
            Err(AuthwardenError::KeySetFetch(_))
        ));
    }
}
