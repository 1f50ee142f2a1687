/*!
 * Authentication contexts
 *
 * An [`AuthenticationContext`] fixes one protocol generation and one
 * credential set. It is built once, shared behind an `Arc` by every handle
 * opened with it, and never mutated afterwards.
 */

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, instrument};

use crate::client::registry::ClientRegistry;
use crate::client::{Dialect, RemoteObject};
use crate::config::{ClientProperties, NegotiationConfig};
use crate::error::Result;
use crate::generation::ProtocolGeneration;
use crate::url::SmbUrl;

/// Generation-tagged credential object produced by a client library
pub struct CredentialHandle {
    generation: ProtocolGeneration,
    inner: Box<dyn Any + Send + Sync>,
}

impl CredentialHandle {
    pub fn new<T: Any + Send + Sync>(generation: ProtocolGeneration, credentials: T) -> Self {
        Self {
            generation,
            inner: Box::new(credentials),
        }
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    /// The library's own credential type, if `T` matches it
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Protocol generation plus bound credentials
pub struct AuthenticationContext {
    generation: ProtocolGeneration,
    domain: String,
    username: String,
    secret: SecretString,
    negotiation: NegotiationConfig,
    properties: ClientProperties,
    credentials: CredentialHandle,
    dialect: Arc<dyn Dialect>,
}

impl AuthenticationContext {
    pub fn builder(generation: ProtocolGeneration) -> AuthenticationContextBuilder {
        AuthenticationContextBuilder::new(generation)
    }

    /// Build a context for `generation`
    ///
    /// Assembles the generation's property map from `negotiation` (the legacy
    /// generation receives an empty map), creates the library's base context
    /// and binds the credentials. No network traffic happens here.
    #[instrument(skip(registry, secret, negotiation))]
    pub fn new(
        registry: &ClientRegistry,
        generation: ProtocolGeneration,
        domain: &str,
        username: &str,
        secret: SecretString,
        negotiation: NegotiationConfig,
    ) -> Result<Arc<Self>> {
        let dialect = registry.get(generation)?;
        let properties = if generation.is_legacy() {
            ClientProperties::empty()
        } else {
            ClientProperties::for_generation(generation, &negotiation)
        };

        let credentials = dialect.build_credentials(&properties, domain, username, &secret)?;
        debug!(domain, username, "Authentication context ready");

        Ok(Arc::new(Self {
            generation,
            domain: domain.to_string(),
            username: username.to_string(),
            secret,
            negotiation,
            properties,
            credentials,
            dialect,
        }))
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn negotiation(&self) -> &NegotiationConfig {
        &self.negotiation
    }

    /// Property map the base context was built from
    pub fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    pub fn credentials(&self) -> &CredentialHandle {
        &self.credentials
    }

    /// Credentials when `generation` matches this context, `None` otherwise
    pub fn credentials_for(&self, generation: ProtocolGeneration) -> Option<&CredentialHandle> {
        (generation == self.generation).then_some(&self.credentials)
    }

    /// Open the generation's native object for `url` without wrapping it
    pub fn open_object(&self, url: &SmbUrl) -> Result<Box<dyn RemoteObject>> {
        self.dialect.open(url, &self.credentials)
    }
}

impl fmt::Debug for AuthenticationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationContext")
            .field("generation", &self.generation)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("properties", &self.properties)
            .finish()
    }
}

/// Builder for [`AuthenticationContext`]
#[derive(Debug)]
pub struct AuthenticationContextBuilder {
    generation: ProtocolGeneration,
    domain: String,
    username: String,
    secret: SecretString,
    negotiation: NegotiationConfig,
}

impl AuthenticationContextBuilder {
    pub fn new(generation: ProtocolGeneration) -> Self {
        Self {
            generation,
            domain: String::new(),
            username: String::new(),
            secret: SecretString::new(String::new().into_boxed_str()),
            negotiation: NegotiationConfig::default(),
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.secret = SecretString::new(password.into().into_boxed_str());
        self
    }

    pub fn secret(mut self, secret: SecretString) -> Self {
        self.secret = secret;
        self
    }

    pub fn negotiation(mut self, negotiation: NegotiationConfig) -> Self {
        self.negotiation = negotiation;
        self
    }

    pub fn build(self, registry: &ClientRegistry) -> Result<Arc<AuthenticationContext>> {
        AuthenticationContext::new(
            registry,
            self.generation,
            &self.domain,
            &self.username,
            self.secret,
            self.negotiation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryCredentials, MemoryServer};
    use crate::config::{PROP_IPC_SIGNING_ENFORCED, PROP_MAX_VERSION, PROP_MIN_VERSION};
    use secrecy::ExposeSecret;

    fn registry() -> ClientRegistry {
        ClientRegistry::with_memory_clients(Arc::new(MemoryServer::new("nas")))
    }

    #[test]
    fn test_context_keeps_identity() {
        let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb212)
            .domain("CORP")
            .username("alice")
            .password("s3cret")
            .build(&registry())
            .unwrap();

        assert_eq!(ctx.generation(), ProtocolGeneration::Smb212);
        assert_eq!(ctx.domain(), "CORP");
        assert_eq!(ctx.username(), "alice");
        assert_eq!(ctx.secret().expose_secret(), "s3cret");
        assert_eq!(ctx.credentials().generation(), ProtocolGeneration::Smb212);
    }

    #[test]
    fn test_only_own_generation_has_credentials() {
        let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb211)
            .build(&registry())
            .unwrap();

        for generation in ProtocolGeneration::ALL {
            let present = ctx.credentials_for(generation).is_some();
            assert_eq!(present, generation == ProtocolGeneration::Smb211);
        }
    }

    #[test]
    fn test_legacy_gets_empty_properties() {
        let negotiation = NegotiationConfig::new()
            .with_version_range("SMB202", "SMB311")
            .with_ipc_signing_enforced(true);
        let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb1)
            .negotiation(negotiation)
            .build(&registry())
            .unwrap();

        assert!(ctx.properties().is_empty());
        let native = ctx.credentials().downcast_ref::<MemoryCredentials>().unwrap();
        assert!(native.properties().is_empty());
    }

    #[test]
    fn test_properties_reach_the_library() {
        let negotiation = NegotiationConfig::new().with_ipc_signing_enforced(true);
        let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb214)
            .negotiation(negotiation)
            .build(&registry())
            .unwrap();

        let native = ctx.credentials().downcast_ref::<MemoryCredentials>().unwrap();
        assert_eq!(native.properties().get(PROP_MIN_VERSION), Some("SMB202"));
        assert_eq!(native.properties().get(PROP_MAX_VERSION), Some("SMB311"));
        assert_eq!(native.properties().get(PROP_IPC_SIGNING_ENFORCED), Some("true"));
    }

    #[test]
    fn test_unregistered_generation_fails() {
        let registry = ClientRegistry::new();
        let err = AuthenticationContext::builder(ProtocolGeneration::Smb201)
            .build(&registry)
            .unwrap_err();
        assert!(err.is_construction());
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn test_rejected_configuration_is_construction_error() {
        let negotiation = NegotiationConfig::new().with_version_range("SMB311", "SMB202");
        let err = AuthenticationContext::builder(ProtocolGeneration::Smb212)
            .negotiation(negotiation)
            .build(&registry())
            .unwrap_err();
        assert!(err.is_construction());
        assert_eq!(err.status_code(), 0);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb201)
            .username("bob")
            .password("hunter2")
            .build(&registry())
            .unwrap();
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("hunter2"));
    }
}
