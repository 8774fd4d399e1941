use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{MethodReceiver, ProxyKind},
    schema::registry::SchemaRegistry,
};
use std::collections::{BTreeMap, HashSet};

///
/// InterfaceValidator
///
/// Structural conformance checking between registered proxy models
/// and their domain bindings, run once over a finished registry.
/// Works purely on the declared models; no domain code is executed.
///
/// Poisoning is cumulative and sticky per proxy token: a type found
/// bad stays bad for the lifetime of the validator (and anything
/// referencing it is poisoned transitively). [`antidote`](Self::antidote)
/// resets the poison set for long-lived validator reuse.
///

#[derive(Debug, Default)]
pub struct InterfaceValidator {
    poisoned: BTreeMap<String, String>,
}

impl InterfaceValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a token has been marked bad by a previous validation.
    #[must_use]
    pub fn is_poisoned(&self, proxy_token: &str) -> bool {
        self.poisoned.contains_key(proxy_token)
    }

    /// Reset all accumulated poison.
    pub fn antidote(&mut self) {
        self.poisoned.clear();
    }

    /// Validate every entity and method binding in the registry.
    ///
    /// All problems are gathered before failing so a misconfigured
    /// schema reports the full extent of the damage at once.
    pub fn validate_registry(&mut self, registry: &SchemaRegistry) -> Result<(), InternalError> {
        self.check_entities(registry);
        let mut problems: Vec<String> = self
            .poisoned
            .iter()
            .map(|(token, reason)| format!("{token}: {reason}"))
            .collect();

        problems.extend(self.check_methods(registry));

        if problems.is_empty() {
            return Ok(());
        }

        Err(InternalError::new(
            ErrorClass::Unsupported,
            ErrorOrigin::Schema,
            format!("schema validation failed: {}", problems.join("; ")),
        ))
    }

    // Local model problems seed the poison set; poison then propagates
    // through reference fields to a fixed point, so reference cycles
    // between healthy types stay healthy.
    fn check_entities(&mut self, registry: &SchemaRegistry) {
        for binding in registry.entities() {
            let model = binding.model;
            let token = model.proxy_token;
            if let Some(reason) = Self::local_problem(registry, model) {
                self.poison(token, reason);
            }
        }

        loop {
            let mut newly_poisoned = Vec::new();
            for binding in registry.entities() {
                let model = binding.model;
                if self.is_poisoned(model.proxy_token) {
                    continue;
                }
                for field in model.fields {
                    if let Some(target) = field.shape.reference_token() {
                        if self.is_poisoned(target) {
                            newly_poisoned.push((
                                model.proxy_token,
                                format!("field '{}' references poisoned type '{target}'", field.name),
                            ));
                            break;
                        }
                    }
                }
            }
            if newly_poisoned.is_empty() {
                break;
            }
            for (token, reason) in newly_poisoned {
                self.poison(token, reason);
            }
        }
    }

    fn local_problem(registry: &SchemaRegistry, model: &crate::model::EntityModel) -> Option<String> {
        match model.kind {
            ProxyKind::Entity => {
                if model.key_kind.is_none() {
                    return Some("entity proxy has no key kind".to_string());
                }
                if !model.has_version {
                    return Some("entity proxy has no version".to_string());
                }
            }
            ProxyKind::Value => {
                if model.key_kind.is_some() {
                    return Some("value proxy must not declare a key kind".to_string());
                }
            }
        }

        let mut seen = HashSet::new();
        for field in model.fields {
            if !seen.insert(field.name) {
                return Some(format!("duplicate field '{}'", field.name));
            }
            if let Some(target) = field.shape.reference_token() {
                if registry.entity(target).is_err() {
                    return Some(format!(
                        "field '{}' references unregistered type '{target}'",
                        field.name
                    ));
                }
            }
        }

        None
    }

    fn check_methods(&self, registry: &SchemaRegistry) -> Vec<String> {
        let mut problems = Vec::new();
        for binding in registry.methods() {
            let model = binding.model;
            let operation = model.operation;

            if let MethodReceiver::Instance(token) = model.receiver {
                match registry.entity(token) {
                    Err(_) => {
                        problems
                            .push(format!("{operation}: receiver type '{token}' is unregistered"));
                    }
                    Ok(receiver) if !receiver.model.is_entity() => {
                        // Value proxies have no identity to address an
                        // instance invocation at.
                        problems.push(format!(
                            "{operation}: receiver type '{token}' is a value proxy"
                        ));
                    }
                    Ok(_) if self.is_poisoned(token) => {
                        problems.push(format!("{operation}: receiver type '{token}' is poisoned"));
                    }
                    Ok(_) => {}
                }
            }

            for (idx, param) in model.params.iter().enumerate() {
                if let Some(token) = param.reference_token() {
                    if registry.entity(token).is_err() {
                        problems.push(format!(
                            "{operation}: param{idx} references unregistered type '{token}'"
                        ));
                    } else if self.is_poisoned(token) {
                        problems.push(format!(
                            "{operation}: param{idx} references poisoned type '{token}'"
                        ));
                    }
                }
            }

            if let Some(token) = model.returns.reference_token() {
                if registry.entity(token).is_err() {
                    problems.push(format!(
                        "{operation}: return references unregistered type '{token}'"
                    ));
                } else if self.is_poisoned(token) {
                    problems.push(format!(
                        "{operation}: return references poisoned type '{token}'"
                    ));
                }
            }
        }

        problems
    }

    fn poison(&mut self, token: &str, reason: String) {
        self.poisoned.entry(token.to_string()).or_insert(reason);
    }
}
