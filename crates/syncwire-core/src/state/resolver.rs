use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::EntityKey,
    model::{FieldShape, ParamShape, ProxyKind, ReturnShape},
    state::{DomainHandle, ProxyBean, RequestState},
    traits::{DomainPtr, DomainValue},
    value::{Value, ValueKind},
};
use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};

///
/// ClientValue
///
/// Client-side view of a resolved domain value. Proxies are carried
/// as bean indices into the owning request state; the encoder decides
/// whether a proxy embeds inline or rides as a reference plus a
/// related-payload entry.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientValue {
    Null,
    Value(Value),
    Proxy(usize),
    List(Vec<ClientValue>),
    Set(Vec<ClientValue>),
}

///
/// ResolveTarget
///
/// The client shape a domain value must resolve into. `Any` lets the
/// domain side pick via the registered type mapping.
///

#[derive(Clone, Debug)]
pub enum ResolveTarget {
    Any,
    Value(ValueKind),
    Proxy(String),
    List(Box<ResolveTarget>),
    Set(Box<ResolveTarget>),
}

impl ResolveTarget {
    #[must_use]
    pub fn for_return(shape: ReturnShape) -> Self {
        match shape {
            ReturnShape::Unit => Self::Any,
            ReturnShape::Value(kind) => Self::Value(kind),
            ReturnShape::ValueList(kind) => Self::List(Box::new(Self::Value(kind))),
            ReturnShape::Proxy(token) => Self::Proxy(token.to_string()),
            ReturnShape::ProxyList(token) => Self::List(Box::new(Self::Proxy(token.to_string()))),
            ReturnShape::ProxySet(token) => Self::Set(Box::new(Self::Proxy(token.to_string()))),
        }
    }

    fn for_field(shape: FieldShape) -> Self {
        match shape {
            FieldShape::Value(kind) => Self::Value(kind),
            FieldShape::ValueList(kind) => Self::List(Box::new(Self::Value(kind))),
            FieldShape::Reference(token) => Self::Proxy(token.to_string()),
            FieldShape::ReferenceList(token) => {
                Self::List(Box::new(Self::Proxy(token.to_string())))
            }
            FieldShape::ReferenceSet(token) => Self::Set(Box::new(Self::Proxy(token.to_string()))),
        }
    }
}

///
/// Resolver
///
/// Memo tables for one resolution pass: the (domain identity, target
/// type) map that breaks graph cycles and keeps proxy identity
/// stable, and per-bean bookkeeping of which property paths have
/// already been walked.
///

#[derive(Default)]
pub struct Resolver {
    resolved: HashMap<(DomainHandle, String), usize>,
    filled: HashMap<usize, BeanFill>,
}

#[derive(Default)]
struct BeanFill {
    simple_done: bool,
    resolved_paths: BTreeSet<String>,
}

/// Expand requested property paths transitively: `a.b.c` implies `a`
/// and `a.b` are also fetchable.
#[must_use]
pub fn expand_property_refs(refs: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for raw in refs {
        let mut path = raw.as_str();
        loop {
            out.insert(path.to_string());
            match path.rfind('.') {
                Some(pos) => path = &path[..pos],
                None => break,
            }
        }
    }

    out
}

/// Whether a property path is requested. `*` matches every property
/// at the current level; list-index suffixes are stripped before
/// comparison.
#[must_use]
pub fn matches_property_ref(refs: &BTreeSet<String>, path: &str) -> bool {
    refs.contains("*") || refs.contains(&strip_indexes(path))
}

// Remove `[n]` spans from a path.
fn strip_indexes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    for ch in path.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }

    out
}

// Property refs for the target of a reference property: paths under
// `field.` re-rooted at the child, plus `*.`-prefixed paths applied
// at every level.
fn derive_child_refs(work: &BTreeSet<String>, field: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let prefix = format!("{field}.");
    for path in work {
        if let Some(rest) = path.strip_prefix(&prefix) {
            out.insert(rest.to_string());
        } else if let Some(rest) = path.strip_prefix("*.") {
            out.insert(rest.to_string());
        }
    }

    out
}

impl RequestState<'_> {
    /// Convert a domain value into a client value assignable to the
    /// target shape, honoring the requested property paths.
    ///
    /// Identity rule: within one resolver pass, the same domain
    /// object resolved to the same target always yields the same
    /// proxy, which is what makes cyclic and diamond-shaped graphs
    /// safe.
    pub fn resolve_client_value(
        &mut self,
        value: &DomainValue,
        target: &ResolveTarget,
        refs: &BTreeSet<String>,
    ) -> Result<ClientValue, InternalError> {
        match value {
            DomainValue::Null => Ok(ClientValue::Null),
            DomainValue::Value(v) => Ok(ClientValue::Value(v.clone())),
            DomainValue::Entity(ptr) => {
                let token = match target {
                    ResolveTarget::Proxy(token) => token.clone(),
                    ResolveTarget::Any => {
                        let domain_path = ptr.borrow().model().domain_path;
                        self.service
                            .resolve_client_type(domain_path, true)?
                            .unwrap_or_default()
                    }
                    other => {
                        return Err(InternalError::resolver_unsupported(format!(
                            "unsupported domain type: entity where {other:?} expected"
                        )));
                    }
                };

                self.resolve_client_proxy(ptr, &token, refs)
            }
            DomainValue::List(items) => {
                let elem = Self::element_target(target, "list")?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_client_value(item, &elem, refs)?);
                }

                Ok(ClientValue::List(out))
            }
            DomainValue::Set(items) => {
                let elem = Self::element_target(target, "set")?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_client_value(item, &elem, refs)?);
                }

                Ok(ClientValue::Set(out))
            }
        }
    }

    fn element_target(target: &ResolveTarget, found: &str) -> Result<ResolveTarget, InternalError> {
        match target {
            ResolveTarget::List(elem) | ResolveTarget::Set(elem) => Ok((**elem).clone()),
            ResolveTarget::Any => Ok(ResolveTarget::Any),
            other => Err(InternalError::resolver_unsupported(format!(
                "unsupported collection type: {found} where {other:?} expected"
            ))),
        }
    }

    // Create or reuse the proxy bean for one domain object, then walk
    // its requested properties.
    fn resolve_client_proxy(
        &mut self,
        ptr: &DomainPtr,
        token: &str,
        refs: &BTreeSet<String>,
    ) -> Result<ClientValue, InternalError> {
        let handle = self.intern(ptr);

        let idx = if let Some(key) = self.stable_key(handle).cloned() {
            // Already known under a client-visible id from this
            // request; an ephemeral id that has since gained a
            // persisted id transitions exactly once.
            let idx = self.bean_index(&key).ok_or_else(|| {
                InternalError::state_invariant(format!("stable key '{key}' has no bean"))
            })?;
            if key.ephemeral {
                let persisted = ptr.borrow().id();
                if let Some(id) = persisted {
                    self.mark_persisted(idx, id.payload())?;
                }
            }

            idx
        } else if let Some(id) = ptr.borrow().id() {
            let key = EntityKey::persisted(&id, token);
            let idx = match self.bean_index(&key) {
                // A separately-loaded instance of an entity already in
                // play resolves onto the existing bean, preserving
                // client-side identity.
                Some(existing) => existing,
                None => self.insert_bean(ProxyBean::new(key.clone(), Some(ptr.clone()))),
            };
            self.associate(handle, key);

            idx
        } else {
            // Unpersisted object returned by server code: assign a
            // synthetic id valid for the duration of the response.
            let key = EntityKey::ephemeral(self.id_factory.allocate_synthetic(), token);
            let idx = self.insert_bean(ProxyBean::new(key.clone(), Some(ptr.clone())));
            self.associate(handle, key);

            idx
        };

        self.bean_mut(idx).in_response = true;

        // Memoize before walking properties; this is the cycle
        // breaker. Re-visits still merge any newly requested paths.
        let memo_key = (handle, token.to_string());
        self.resolver.resolved.entry(memo_key).or_insert(idx);
        self.fill_properties(idx, ptr, token, refs)?;

        Ok(ClientValue::Proxy(idx))
    }

    // Walk the declared properties of one bean. Scalar and value-list
    // properties resolve on first visit; reference properties resolve
    // only when requested (value proxies always resolve fully, having
    // no identity to fetch lazily).
    fn fill_properties(
        &mut self,
        idx: usize,
        ptr: &DomainPtr,
        token: &str,
        refs: &BTreeSet<String>,
    ) -> Result<(), InternalError> {
        let service = self.service;
        let model = service.resolve_domain_type(token)?.model;
        let is_value_proxy = matches!(model.kind, ProxyKind::Value);

        let (need_simple, work) = {
            let fill = self.resolver.filled.entry(idx).or_default();
            let work: BTreeSet<String> = refs
                .difference(&fill.resolved_paths)
                .cloned()
                .collect();
            let need_simple = !fill.simple_done;
            if !need_simple && work.is_empty() {
                return Ok(());
            }
            fill.simple_done = true;
            fill.resolved_paths.extend(work.iter().cloned());

            (need_simple, work)
        };

        for field in model.fields {
            match field.shape {
                FieldShape::Value(_) | FieldShape::ValueList(_) => {
                    if !need_simple {
                        continue;
                    }
                    let value = ptr.borrow().get(field.name)?;
                    let client = match value {
                        DomainValue::Null => ClientValue::Null,
                        DomainValue::Value(v) => ClientValue::Value(v),
                        other => {
                            return Err(InternalError::schema_unsupported(format!(
                                "property '{}' declared scalar but produced {other:?}",
                                field.name
                            )));
                        }
                    };
                    self.bean_mut(idx).properties.insert(field.name.to_string(), client);
                }
                _ => {
                    let requested =
                        (is_value_proxy && need_simple) || matches_property_ref(&work, field.name);
                    if !requested {
                        continue;
                    }

                    let value = ptr.borrow().get(field.name)?;
                    if value.is_null() {
                        continue;
                    }

                    let child_refs = derive_child_refs(&work, field.name);
                    let target = ResolveTarget::for_field(field.shape);
                    let client = self.resolve_client_value(&value, &target, &child_refs)?;
                    self.bean_mut(idx).properties.insert(field.name.to_string(), client);
                }
            }
        }

        Ok(())
    }

    // ── client → domain ───────────────────────────────────────────

    /// Decode one invocation parameter into a domain value.
    ///
    /// Dead-entity detection applies to every proxy-valued shape
    /// except plain id references, which decode to null when stale.
    pub fn decode_param(
        &mut self,
        shape: ParamShape,
        json: &Json,
    ) -> Result<DomainValue, InternalError> {
        match shape {
            ParamShape::Value(kind) => Ok(Value::from_json(kind, json)?.into()),
            ParamShape::ValueList(kind) => Ok(Value::list_from_json(kind, json)?.into()),
            ParamShape::Proxy(_) => self.decode_proxy_ref(json, true),
            ParamShape::ProxyId(_) => self.decode_proxy_ref(json, false),
            ParamShape::ProxyList(_) => {
                let Json::Array(items) = json else {
                    return Err(InternalError::decode_unsupported(format!(
                        "expected array of entity references, found {json}"
                    )));
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.decode_proxy_ref(item, true)?);
                }

                Ok(DomainValue::List(out))
            }
        }
    }

    /// Decode one delta-payload field into a domain value. References
    /// in payloads never dead-entity check; a stale reference writes
    /// null, mirroring what the client observed.
    pub fn decode_field(
        &mut self,
        shape: FieldShape,
        json: &Json,
    ) -> Result<DomainValue, InternalError> {
        match shape {
            FieldShape::Value(kind) => Ok(Value::from_json(kind, json)?.into()),
            FieldShape::ValueList(kind) => Ok(Value::list_from_json(kind, json)?.into()),
            FieldShape::Reference(_) => self.decode_proxy_ref(json, false),
            FieldShape::ReferenceList(_) | FieldShape::ReferenceSet(_) => {
                if json.is_null() {
                    return Ok(DomainValue::Null);
                }
                let Json::Array(items) = json else {
                    return Err(InternalError::decode_unsupported(format!(
                        "expected array of entity references, found {json}"
                    )));
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.decode_proxy_ref(item, false)?);
                }

                Ok(DomainValue::List(out))
            }
        }
    }

    /// Resolve an encoded entity reference back to its domain object.
    pub fn decode_proxy_ref(
        &mut self,
        json: &Json,
        detect_dead: bool,
    ) -> Result<DomainValue, InternalError> {
        if json.is_null() {
            return Ok(DomainValue::Null);
        }
        let Some(encoded) = json.as_str() else {
            return Err(InternalError::decode_unsupported(format!(
                "expected entity reference string, found {json}"
            )));
        };

        let key = EntityKey::parse(encoded)?;
        if key.ephemeral && self.bean_index(&key).is_none() {
            // A future id must have been introduced by a delta record
            // in this same request.
            return Err(InternalError::decode_invariant(format!(
                "future entity '{key}' has no delta record"
            )));
        }
        let idx = self.get_bean_for_payload(&key)?;
        match self.bean(idx).domain.clone() {
            Some(ptr) => Ok(DomainValue::Entity(ptr)),
            None if detect_dead => Err(InternalError::new(
                ErrorClass::DeadEntity,
                ErrorOrigin::Resolver,
                "the requested entity is not available on the server",
            )),
            None => Ok(DomainValue::Null),
        }
    }
}
