mod cache;

pub use cache::ResolutionCache;

use crate::{
    error::{DomainError, InternalError},
    key::Key,
    schema::{EntityBinding, MethodBinding, SchemaRegistry},
    traits::{DomainObject, DomainPtr, DomainValue, Issue, validate},
};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tracing::debug;

///
/// ServiceConfig
///
/// Construction-time policy for one service stack. Cache bounds are
/// explicit; there is no process-global cache state.
///

#[derive(Clone, Copy, Debug)]
pub struct ServiceConfig {
    pub cache_capacity: u64,
    pub cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
            cache_ttl: Duration::from_secs(600),
        }
    }
}

///
/// ServiceStack
///
/// The service pipeline over domain objects: schema-table dispatch
/// fronted by the resolution cache, with locators as the data-store
/// seam. Composed once at startup; stateless per request.
///
/// Failure split: unknown tokens, fields, or operations indicate a
/// broken client/domain mapping and abort the request as internal
/// errors; a [`DomainError`] from an invoked method is business
/// failure and stays scoped to its invocation.
///

pub struct ServiceStack {
    registry: SchemaRegistry,
    cache: ResolutionCache,
}

impl ServiceStack {
    #[must_use]
    pub fn new(registry: SchemaRegistry, config: ServiceConfig) -> Self {
        Self {
            registry,
            cache: ResolutionCache::new(config.cache_capacity, config.cache_ttl),
        }
    }

    // ── type resolution ───────────────────────────────────────────

    /// Resolve a proxy token to its entity binding.
    pub fn resolve_domain_type(&self, proxy_token: &str) -> Result<&EntityBinding, InternalError> {
        self.registry.entity(proxy_token).map_err(Into::into)
    }

    /// Resolve a domain path to its proxy token.
    ///
    /// With `required`, an unmapped path is a fatal mapping error;
    /// otherwise `None` is returned.
    pub fn resolve_client_type(
        &self,
        domain_path: &str,
        required: bool,
    ) -> Result<Option<String>, InternalError> {
        let token = self.cache.client_type(domain_path, || {
            self.registry
                .entity_for_domain(domain_path)
                .ok()
                .map(|b| b.model.proxy_token.to_string())
        });

        match token {
            Some(token) => Ok(Some(token)),
            None if required => Err(InternalError::schema_not_found(format!(
                "domain type '{domain_path}' has no registered proxy mapping"
            ))),
            None => Ok(None),
        }
    }

    /// Resolve an operation token to its method binding.
    pub fn resolve_method(&self, operation: &str) -> Result<&MethodBinding, InternalError> {
        self.registry.method(operation).map_err(Into::into)
    }

    // ── entity lifecycle ──────────────────────────────────────────

    /// Default-construct a domain object of the given proxy type.
    pub fn create_domain_object(&self, proxy_token: &str) -> Result<DomainPtr, InternalError> {
        let binding = self.resolve_domain_type(proxy_token)?;
        debug!(proxy_token, "create domain object");

        binding.locator.create()
    }

    /// Load a domain object; `None` means "no longer available", not
    /// an error.
    pub fn load_domain_object(
        &self,
        proxy_token: &str,
        key: &Key,
    ) -> Result<Option<DomainPtr>, InternalError> {
        let binding = self.resolve_domain_type(proxy_token)?;

        binding.locator.load(key)
    }

    /// Whether the entity is still present in the backing store.
    pub fn is_live(&self, proxy_token: &str, key: &Key) -> Result<bool, InternalError> {
        let binding = self.resolve_domain_type(proxy_token)?;

        binding.locator.is_live(key)
    }

    /// The entity's persisted id; `None` means not yet persisted.
    pub fn get_id(&self, obj: &dyn DomainObject) -> Option<Key> {
        obj.id()
    }

    /// The entity's version; `None` means not yet persisted.
    pub fn get_version(&self, obj: &dyn DomainObject) -> Option<u64> {
        obj.version()
    }

    // ── property access ───────────────────────────────────────────

    pub fn get_property(
        &self,
        obj: &dyn DomainObject,
        field: &str,
    ) -> Result<DomainValue, InternalError> {
        obj.get(field).map_err(Into::into)
    }

    pub fn set_property(
        &self,
        obj: &mut dyn DomainObject,
        field: &str,
        value: DomainValue,
    ) -> Result<(), InternalError> {
        obj.set(field, value).map_err(Into::into)
    }

    // ── invocation & validation ───────────────────────────────────

    /// Invoke a bound method. Domain failures stay [`DomainError`];
    /// they are reported per invocation, never escalated.
    pub fn invoke(
        &self,
        binding: &MethodBinding,
        receiver: Option<DomainPtr>,
        args: Vec<DomainValue>,
    ) -> Result<DomainValue, DomainError> {
        debug!(operation = binding.model.operation, argc = args.len(), "invoke");

        (binding.invoke)(receiver, args)
    }

    /// Run validation over one domain object, collecting issues.
    pub fn validate(&self, obj: &dyn DomainObject) -> Vec<Issue> {
        validate(obj)
    }

    // ── property-ref expansion ────────────────────────────────────

    /// Expand requested property paths transitively, memoized:
    /// `a.b.c` implies `a` and `a.b` are also fetchable.
    pub fn expanded_refs(&self, refs: &[String]) -> Arc<BTreeSet<String>> {
        self.cache
            .expanded_refs(refs, crate::state::expand_property_refs)
    }
}
