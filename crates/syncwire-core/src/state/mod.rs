mod resolver;
mod snapshot;

pub use resolver::*;
pub use snapshot::*;

use crate::{
    error::InternalError,
    key::EntityKey,
    service::ServiceStack,
    traits::{DomainObject, DomainPtr},
};
use std::{cell::RefCell, collections::HashMap, rc::Rc};
use tracing::debug;

///
/// DomainHandle
///
/// Dense per-request index of one distinct domain object. Identity
/// bookkeeping (cycle breaking, echo detection) is keyed by handle,
/// never by pointer value.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DomainHandle(usize);

///
/// ProxyBean
///
/// One client-visible proxy under construction during a request: its
/// current key, the materialized domain object (absent for dead
/// entities), and the resolved property map destined for the
/// response.
///

pub struct ProxyBean {
    pub key: EntityKey,
    pub domain: Option<DomainPtr>,
    /// Server id payload once known, for keys that started ephemeral.
    pub persisted_id: Option<String>,
    /// Version the client sent with its delta, used to suppress echo
    /// updates.
    pub client_version: Option<u64>,
    /// Pristine image captured at materialization, diffed later to
    /// classify updates.
    pub before: Option<EntitySnapshot>,
    pub in_response: bool,
    pub properties: std::collections::BTreeMap<String, ClientValue>,
}

impl ProxyBean {
    fn new(key: EntityKey, domain: Option<DomainPtr>) -> Self {
        Self {
            key,
            domain,
            persisted_id: None,
            client_version: None,
            before: None,
            in_response: false,
            properties: std::collections::BTreeMap::new(),
        }
    }
}

///
/// IdFactory
///
/// Allocates response-local synthetic ids for unpersisted objects
/// first observed while resolving a return graph.
///

#[derive(Debug, Default)]
pub struct IdFactory {
    next_synthetic: u64,
}

impl IdFactory {
    pub fn allocate_synthetic(&mut self) -> String {
        self.next_synthetic += 1;

        format!("s{}", self.next_synthetic)
    }
}

///
/// RequestState
///
/// Per-request mutable context: the bean map (insertion-ordered), the
/// domain-identity arena, and the id factory. One instance is built
/// per incoming request and dropped with it; the processor itself
/// stays stateless.
///
/// The resolver's memo tables live beside the identity maps and can
/// be reset independently ([`fresh_resolver`](Self::fresh_resolver)),
/// which is how the before-invocation and after-invocation resolution
/// passes are separated while still sharing bean identity.
///

pub struct RequestState<'a> {
    pub(crate) service: &'a ServiceStack,
    beans: Vec<ProxyBean>,
    beans_by_key: HashMap<EntityKey, usize>,
    payload_keys: Vec<EntityKey>,
    /// Keeps every interned object alive so addresses (and therefore
    /// handles) cannot be recycled mid-request.
    interned: Vec<DomainPtr>,
    handles_by_ptr: HashMap<usize, DomainHandle>,
    key_by_handle: HashMap<DomainHandle, EntityKey>,
    pub(crate) id_factory: IdFactory,
    pub(crate) resolver: Resolver,
}

impl<'a> RequestState<'a> {
    #[must_use]
    pub fn new(service: &'a ServiceStack) -> Self {
        Self {
            service,
            beans: Vec::new(),
            beans_by_key: HashMap::new(),
            payload_keys: Vec::new(),
            interned: Vec::new(),
            handles_by_ptr: HashMap::new(),
            key_by_handle: HashMap::new(),
            id_factory: IdFactory::default(),
            resolver: Resolver::default(),
        }
    }

    #[must_use]
    pub const fn service(&self) -> &'a ServiceStack {
        self.service
    }

    /// Reset the resolver memo while keeping bean identity. Starts
    /// the after-invocation resolution pass.
    pub fn fresh_resolver(&mut self) {
        self.resolver = Resolver::default();
    }

    // ── beans ─────────────────────────────────────────────────────

    #[must_use]
    pub fn bean(&self, idx: usize) -> &ProxyBean {
        &self.beans[idx]
    }

    pub(crate) fn bean_mut(&mut self, idx: usize) -> &mut ProxyBean {
        &mut self.beans[idx]
    }

    #[must_use]
    pub fn bean_index(&self, key: &EntityKey) -> Option<usize> {
        self.beans_by_key.get(key).copied()
    }

    /// Keys materialized from payload content (delta records and
    /// parameter references), in first-appearance order. These are
    /// the keys side effects report on.
    #[must_use]
    pub fn payload_keys(&self) -> &[EntityKey] {
        &self.payload_keys
    }

    /// Idempotently materialize the bean for a payload key.
    ///
    /// Ephemeral keys construct a fresh domain object; persisted keys
    /// load through the locator, and a missing row produces a bean
    /// with no domain tag (a dead entity), not an error. Persisted
    /// loads capture the pristine before-image for later diffing.
    pub fn get_bean_for_payload(&mut self, key: &EntityKey) -> Result<usize, InternalError> {
        if let Some(idx) = self.beans_by_key.get(key) {
            return Ok(*idx);
        }

        let binding = self.service.resolve_domain_type(&key.proxy_token)?;
        let domain = if key.ephemeral {
            if !binding.model.is_entity() {
                // Value proxies have no identity; they are never
                // independently created or addressed.
                return Err(InternalError::schema_unsupported(format!(
                    "value proxy '{}' cannot be created as an entity",
                    key.proxy_token
                )));
            }
            let obj = binding.locator.create()?;
            debug!(key = %key, "materialized future entity");
            Some(obj)
        } else {
            let Some(kind) = binding.model.key_kind else {
                return Err(InternalError::schema_unsupported(format!(
                    "value proxy '{}' has no addressable identity",
                    key.proxy_token
                )));
            };
            let decoded = key.decoded_key(kind)?;

            binding.locator.load(&decoded)?
        };

        let mut bean = ProxyBean::new(key.clone(), domain);
        if let Some(obj) = &bean.domain {
            let handle = self.intern(obj);
            self.key_by_handle.insert(handle, key.clone());
            if !key.ephemeral {
                bean.before = Some(EntitySnapshot::capture(&*obj.borrow())?);
            }
        }
        self.payload_keys.push(key.clone());

        Ok(self.insert_bean(bean))
    }

    pub(crate) fn insert_bean(&mut self, bean: ProxyBean) -> usize {
        let idx = self.beans.len();
        self.beans_by_key.insert(bean.key.clone(), idx);
        self.beans.push(bean);

        idx
    }

    // ── domain identity ───────────────────────────────────────────

    /// Assign (or look up) the dense handle for a domain object.
    pub fn intern(&mut self, ptr: &DomainPtr) -> DomainHandle {
        let raw = Rc::as_ptr(ptr).cast::<RefCell<()>>() as usize;
        if let Some(handle) = self.handles_by_ptr.get(&raw) {
            return *handle;
        }

        let handle = DomainHandle(self.interned.len());
        self.interned.push(ptr.clone());
        self.handles_by_ptr.insert(raw, handle);

        handle
    }

    /// The client-visible key already associated with this domain
    /// object, if any. Keeps an object created under an ephemeral id
    /// and echoed back from a method on its original identity.
    #[must_use]
    pub fn stable_key(&self, handle: DomainHandle) -> Option<&EntityKey> {
        self.key_by_handle.get(&handle)
    }

    pub(crate) fn associate(&mut self, handle: DomainHandle, key: EntityKey) {
        self.key_by_handle.insert(handle, key);
    }

    /// Record the ephemeral-to-persisted transition for a bean.
    ///
    /// The transition happens at most once per request; a second
    /// transition to a different id is an internal invariant failure.
    pub fn mark_persisted(&mut self, idx: usize, id_payload: String) -> Result<(), InternalError> {
        let bean = &mut self.beans[idx];
        match &bean.persisted_id {
            None => {
                debug!(key = %bean.key, id = %id_payload, "ephemeral id persisted");
                bean.persisted_id = Some(id_payload);
                Ok(())
            }
            Some(existing) if *existing == id_payload => Ok(()),
            Some(existing) => Err(InternalError::state_invariant(format!(
                "entity '{}' persisted twice with different ids: '{existing}' then '{id_payload}'",
                bean.key
            ))),
        }
    }

    /// Validate every materialized entity, gathering issues tagged
    /// with their bean index.
    #[must_use]
    pub fn validate_beans(&self) -> Vec<(usize, crate::traits::Issue)> {
        let mut out = Vec::new();
        for (idx, bean) in self.beans.iter().enumerate() {
            // The object may have been deleted out from under us.
            let Some(domain) = &bean.domain else {
                continue;
            };
            for issue in crate::traits::validate(&*domain.borrow()) {
                out.push((idx, issue));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{demo_service, seed_song};
    use crate::key::Key;

    #[test]
    fn bean_materialization_is_idempotent() {
        let service = demo_service();
        let mut state = RequestState::new(&service);

        let key = seed_song("Before the Flood", 1);
        let entity_key = EntityKey::persisted(&key, "demo.SongProxy");

        let a = state.get_bean_for_payload(&entity_key).unwrap();
        let b = state.get_bean_for_payload(&entity_key).unwrap();
        assert_eq!(a, b);
        assert!(state.bean(a).domain.is_some());
    }

    #[test]
    fn missing_entity_yields_dead_bean_not_error() {
        let service = demo_service();
        let mut state = RequestState::new(&service);

        let entity_key = EntityKey::persisted(&Key::Uint(424_242), "demo.SongProxy");
        let idx = state.get_bean_for_payload(&entity_key).unwrap();
        assert!(state.bean(idx).domain.is_none());
    }

    #[test]
    fn ephemeral_key_constructs_and_interns() {
        let service = demo_service();
        let mut state = RequestState::new(&service);

        let entity_key = EntityKey::ephemeral("7", "demo.SongProxy");
        let idx = state.get_bean_for_payload(&entity_key).unwrap();

        let ptr = state.bean(idx).domain.clone().unwrap();
        let handle = state.intern(&ptr);
        assert_eq!(state.stable_key(handle), Some(&entity_key));
    }

    #[test]
    fn interning_is_identity_stable() {
        let service = demo_service();
        let mut state = RequestState::new(&service);

        let a = service.create_domain_object("demo.SongProxy").unwrap();
        let b = service.create_domain_object("demo.SongProxy").unwrap();

        let ha = state.intern(&a);
        assert_eq!(state.intern(&a), ha);
        assert_ne!(state.intern(&b), ha);
    }

    #[test]
    fn persist_transition_happens_at_most_once() {
        let service = demo_service();
        let mut state = RequestState::new(&service);

        let entity_key = EntityKey::ephemeral("7", "demo.SongProxy");
        let idx = state.get_bean_for_payload(&entity_key).unwrap();

        state.mark_persisted(idx, "11".to_string()).unwrap();
        state.mark_persisted(idx, "11".to_string()).unwrap();
        let err = state.mark_persisted(idx, "12".to_string()).unwrap_err();
        assert!(err.message.contains("persisted twice"));
    }

    #[test]
    fn synthetic_ids_are_unique_within_a_request() {
        let mut factory = IdFactory::default();
        let a = factory.allocate_synthetic();
        let b = factory.allocate_synthetic();
        assert_ne!(a, b);
    }
}
