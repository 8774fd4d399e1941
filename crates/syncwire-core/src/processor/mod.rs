mod side_effects;

use crate::{
    error::{DomainError, InternalError},
    key::EntityKey,
    schema::MethodBinding,
    service::ServiceStack,
    state::{ClientValue, RequestState, ResolveTarget},
    traits::{DomainPtr, DomainValue},
    wire::{
        FUTURE_ID_PROPERTY, ID_PROPERTY, InvocationMessage, RequestEnvelope, ResponseEnvelope,
        ServerFailure, VERSION_PROPERTY, ViolationMessage, WireError,
    },
};
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use tracing::{debug, warn};

///
/// ProcessorConfig
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessorConfig {
    /// Include internal classification detail in failure payloads.
    pub include_traces: bool,
}

///
/// ExceptionHandler
///
/// Converts failures into client-reportable [`ServerFailure`]
/// payloads. Domain failures stay scoped to their invocation slot;
/// fatal failures replace the whole response envelope.
///

pub trait ExceptionHandler: Send + Sync {
    fn on_domain_failure(&self, err: &DomainError) -> ServerFailure;

    fn on_fatal(&self, err: &InternalError) -> ServerFailure;
}

///
/// DefaultExceptionHandler
///

pub struct DefaultExceptionHandler {
    include_traces: bool,
}

impl DefaultExceptionHandler {
    #[must_use]
    pub const fn new(include_traces: bool) -> Self {
        Self { include_traces }
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn on_domain_failure(&self, err: &DomainError) -> ServerFailure {
        ServerFailure {
            exception_type: err.type_name.clone(),
            message: err.message.clone(),
            trace: None,
            fatal: false,
        }
    }

    fn on_fatal(&self, err: &InternalError) -> ServerFailure {
        ServerFailure {
            exception_type: "InternalError".to_string(),
            message: err.message.clone(),
            trace: self.include_traces.then(|| err.display_with_class()),
            fatal: true,
        }
    }
}

// Per-invocation outcome before encoding.
enum Slot {
    Ok(ClientValue),
    Fail(ServerFailure),
}

// Failure routing during one invocation: reportable failures land in
// their slot, everything else aborts the request.
enum InvocationFailure {
    Reportable(ServerFailure),
    Fatal(InternalError),
}

///
/// RequestProcessor
///
/// Processes request payloads from a syncwire client. Stateless and
/// reusable: every call builds a fresh [`RequestState`], so a single
/// instance may serve concurrent requests.
///

pub struct RequestProcessor {
    service: ServiceStack,
    exception_handler: Box<dyn ExceptionHandler>,
}

impl RequestProcessor {
    #[must_use]
    pub fn new(service: ServiceStack) -> Self {
        Self::with_config(service, ProcessorConfig::default())
    }

    #[must_use]
    pub fn with_config(service: ServiceStack, config: ProcessorConfig) -> Self {
        Self {
            service,
            exception_handler: Box::new(DefaultExceptionHandler::new(config.include_traces)),
        }
    }

    pub fn set_exception_handler(&mut self, handler: impl ExceptionHandler + 'static) {
        self.exception_handler = Box::new(handler);
    }

    #[must_use]
    pub const fn service(&self) -> &ServiceStack {
        &self.service
    }

    /// Process one request payload, returning the response payload.
    #[must_use]
    pub fn process(&self, payload: &str) -> String {
        let envelope = match RequestEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "malformed request payload");
                return ResponseEnvelope::failure(self.exception_handler.on_fatal(&err.into()))
                    .encode();
            }
        };

        self.process_envelope(&envelope).encode()
    }

    /// Process a decoded request envelope.
    #[must_use]
    pub fn process_envelope(&self, req: &RequestEnvelope) -> ResponseEnvelope {
        match self.run(req) {
            Ok(resp) => resp,
            Err(err) => {
                // The envelope under construction is in an unknown
                // state; report the failure on a fresh one.
                warn!(error = %err.display_with_class(), "request aborted");
                ResponseEnvelope::failure(self.exception_handler.on_fatal(&err))
            }
        }
    }

    fn run(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, InternalError> {
        let mut state = RequestState::new(&self.service);

        // Apply the delta value store.
        self.apply_writes(&mut state, req)?;

        // Validation gates the whole request: with any violation, no
        // invocation runs and no side effects are computed.
        let violations = Self::collect_violations(&state);
        if !violations.is_empty() {
            debug!(count = violations.len(), "validation gate closed");
            return Ok(ResponseEnvelope {
                violations,
                ..ResponseEnvelope::default()
            });
        }

        // Invocations; each slot succeeds or fails on its own.
        state.fresh_resolver();
        let mut slots = Vec::with_capacity(req.invocations.len());
        let mut status_codes = Vec::with_capacity(req.invocations.len());
        for invocation in &req.invocations {
            let binding = self.service.resolve_method(&invocation.operation)?;
            match self.run_invocation(&mut state, binding, invocation) {
                Ok(value) => {
                    slots.push(Slot::Ok(value));
                    status_codes.push(true);
                }
                Err(InvocationFailure::Reportable(failure)) => {
                    slots.push(Slot::Fail(failure));
                    status_codes.push(false);
                }
                Err(InvocationFailure::Fatal(err)) => return Err(err),
            }
        }

        let side_effects = side_effects::compute(&state)?;

        // Encode results and the related-entity payloads they pull in.
        let mut related = Map::new();
        let mut results = Vec::with_capacity(slots.len());
        for slot in &slots {
            results.push(match slot {
                Slot::Ok(value) => {
                    let mut embedding = HashSet::new();
                    encode_client_value(&state, value, &mut related, true, &mut embedding)
                }
                Slot::Fail(failure) => {
                    serde_json::to_value(failure).unwrap_or(Json::Null)
                }
            });
        }

        Ok(ResponseEnvelope {
            results,
            status_codes,
            side_effects,
            related,
            violations: Vec::new(),
            general_failure: None,
        })
    }

    // Decode the delta value store and apply each record's properties
    // to its materialized entity. Involved-key ordering lives in the
    // request state's payload-key list.
    fn apply_writes(
        &self,
        state: &mut RequestState<'_>,
        req: &RequestEnvelope,
    ) -> Result<(), InternalError> {
        for (op, token, body) in req.delta_records()? {
            let id_json = body
                .get(ID_PROPERTY)
                .ok_or_else(|| WireError::MissingId(token.clone()))?;
            let id = match id_json {
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                other => {
                    return Err(InternalError::decode_unsupported(format!(
                        "entity id must be a string or number, found {other}"
                    )));
                }
            };

            let key = EntityKey {
                id,
                ephemeral: op.is_create(),
                proxy_token: token.clone(),
            };
            debug!(key = %key, op = ?op, "delta record");

            let idx = state.get_bean_for_payload(&key)?;
            if let Some(version) = body.get(VERSION_PROPERTY).and_then(Json::as_u64) {
                state.bean_mut(idx).client_version = Some(version);
            }

            // The object may no longer exist; a vanished update target
            // contributes nothing further.
            let Some(domain) = state.bean(idx).domain.clone() else {
                continue;
            };

            let model = self.service.resolve_domain_type(&key.proxy_token)?.model;
            for (name, value) in body {
                if name == ID_PROPERTY || name == VERSION_PROPERTY || name == FUTURE_ID_PROPERTY {
                    continue;
                }
                let Some(field) = model.field(name) else {
                    return Err(InternalError::decode_invariant(format!(
                        "property '{name}' is not permitted to be set on '{token}'"
                    )));
                };
                let decoded = state.decode_field(field.shape, value)?;
                self.service
                    .set_property(&mut *domain.borrow_mut(), name, decoded)?;
            }
        }

        Ok(())
    }

    fn collect_violations(state: &RequestState<'_>) -> Vec<ViolationMessage> {
        let mut out = Vec::new();
        for (idx, issue) in state.validate_beans() {
            let key = &state.bean(idx).key;
            let (id, future_id) = if key.ephemeral {
                (None, Some(key.id.clone()))
            } else {
                (Some(key.to_string()), None)
            };
            out.push(ViolationMessage {
                id,
                future_id,
                path: issue.path,
                message: issue.message,
            });
        }

        out
    }

    fn run_invocation(
        &self,
        state: &mut RequestState<'_>,
        binding: &MethodBinding,
        invocation: &InvocationMessage,
    ) -> Result<ClientValue, InvocationFailure> {
        let model = binding.model;
        let params = invocation.params();

        let receiver_arity = usize::from(model.is_instance());
        if params.len() != model.params.len() + receiver_arity {
            return Err(InvocationFailure::Fatal(InternalError::processor_invariant(
                format!(
                    "operation '{}' takes {} parameters, request carries {}",
                    model.operation,
                    model.params.len() + receiver_arity,
                    params.len()
                ),
            )));
        }

        // Instance receivers ride as param0 and are always
        // dead-entity checked.
        let receiver: Option<DomainPtr> = if model.is_instance() {
            match state.decode_proxy_ref(params[0], true) {
                Ok(DomainValue::Entity(ptr)) => Some(ptr),
                Ok(_) => {
                    return Err(InvocationFailure::Fatal(InternalError::processor_invariant(
                        format!("operation '{}' invoked without a receiver", model.operation),
                    )));
                }
                Err(err) => return Err(Self::route_decode_failure(err)),
            }
        } else {
            None
        };

        let mut args = Vec::with_capacity(model.params.len());
        for (shape, json) in model.params.iter().zip(&params[receiver_arity..]) {
            match state.decode_param(*shape, json) {
                Ok(value) => args.push(value),
                Err(err) => return Err(Self::route_decode_failure(err)),
            }
        }

        let returned = self
            .service
            .invoke(binding, receiver, args)
            .map_err(|err| {
                debug!(operation = model.operation, error = %err, "invocation failed");
                InvocationFailure::Reportable(self.exception_handler.on_domain_failure(&err))
            })?;

        let refs = self.service.expanded_refs(&invocation.property_refs);
        let target = ResolveTarget::for_return(model.returns);
        state
            .resolve_client_value(&returned, &target, &refs)
            .map_err(InvocationFailure::Fatal)
    }

    // Dead references are a client-visible condition, not a server
    // crash; everything else aborts.
    fn route_decode_failure(err: InternalError) -> InvocationFailure {
        if err.is_dead_entity() {
            InvocationFailure::Reportable(ServerFailure {
                exception_type: "DeadEntity".to_string(),
                message: err.message,
                trace: None,
                fatal: false,
            })
        } else {
            InvocationFailure::Fatal(err)
        }
    }
}

// ── response encoding ─────────────────────────────────────────────

// Encode one resolved client value. Top-level entities (and elements
// of top-level collections) embed their property maps; nested entity
// references encode as key strings backed by a `related` payload
// entry. Value proxies always embed inline.
fn encode_client_value(
    state: &RequestState<'_>,
    value: &ClientValue,
    related: &mut Map<String, Json>,
    top: bool,
    embedding: &mut HashSet<usize>,
) -> Json {
    match value {
        ClientValue::Null => Json::Null,
        ClientValue::Value(v) => v.to_json(),
        ClientValue::List(items) | ClientValue::Set(items) => Json::Array(
            items
                .iter()
                .map(|item| encode_client_value(state, item, related, top, embedding))
                .collect(),
        ),
        ClientValue::Proxy(idx) => encode_proxy(state, *idx, related, top, embedding),
    }
}

fn encode_proxy(
    state: &RequestState<'_>,
    idx: usize,
    related: &mut Map<String, Json>,
    top: bool,
    embedding: &mut HashSet<usize>,
) -> Json {
    let bean = state.bean(idx);
    let model = state
        .service()
        .resolve_domain_type(&bean.key.proxy_token)
        .map(|binding| binding.model);
    let is_entity = model.as_ref().is_ok_and(|m| m.is_entity());

    if !is_entity {
        // Value proxies embed wherever they appear; a cyclic value
        // graph bottoms out as null rather than recursing forever.
        if !embedding.insert(idx) {
            return Json::Null;
        }
        let mut obj = Map::new();
        for (name, value) in &bean.properties {
            obj.insert(
                name.clone(),
                encode_client_value(state, value, related, false, embedding),
            );
        }
        embedding.remove(&idx);

        return Json::Object(obj);
    }

    let key = current_key(state, idx);
    if top {
        let mut obj = Map::new();
        obj.insert(ID_PROPERTY.to_string(), Json::String(key.to_string()));
        if let Some(version) = bean.domain.as_ref().and_then(|d| d.borrow().version()) {
            obj.insert(VERSION_PROPERTY.to_string(), Json::from(version));
        }
        for (name, value) in &bean.properties {
            obj.insert(
                name.clone(),
                encode_client_value(state, value, related, false, embedding),
            );
        }

        Json::Object(obj)
    } else {
        let address = key.address();
        if !related.contains_key(&address) {
            // Insert a marker first so reference cycles terminate.
            related.insert(address.clone(), Json::Null);
            let embedded = encode_proxy(state, idx, related, true, embedding);
            related.insert(address.clone(), embedded);
        }

        Json::String(key.to_string())
    }
}

// The client-visible key, reflecting an ephemeral-to-persisted
// transition if one happened during this request.
fn current_key(state: &RequestState<'_>, idx: usize) -> EntityKey {
    let bean = state.bean(idx);
    match &bean.persisted_id {
        Some(id) => EntityKey {
            id: id.clone(),
            ephemeral: false,
            proxy_token: bean.key.proxy_token.clone(),
        },
        None => bean.key.clone(),
    }
}
