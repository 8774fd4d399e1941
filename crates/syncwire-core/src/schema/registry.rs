use crate::{
    error::{DomainError, ErrorClass, ErrorOrigin, InternalError},
    model::{EntityModel, MethodModel},
    traits::{DomainPtr, DomainValue, EntityLocator},
};
use std::collections::HashMap;
use thiserror::Error as ThisError;

///
/// SchemaRegistryError
///

#[derive(Debug, ThisError)]
pub enum SchemaRegistryError {
    #[error("proxy type '{0}' not found")]
    EntityNotFound(String),

    #[error("proxy type '{0}' already registered")]
    EntityAlreadyRegistered(String),

    #[error("proxy token '{0}' must not contain '-'")]
    BadProxyToken(String),

    #[error("operation '{0}' not found")]
    OperationNotFound(String),

    #[error("operation '{0}' already registered")]
    OperationAlreadyRegistered(String),

    #[error("operation '{0}' is not of the form '<Service>::<method>'")]
    BadOperationToken(String),

    #[error("domain type '{0}' has no registered proxy mapping")]
    DomainNotMapped(String),
}

impl SchemaRegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::EntityNotFound(_) | Self::OperationNotFound(_) | Self::DomainNotMapped(_) => {
                ErrorClass::NotFound
            }
            Self::EntityAlreadyRegistered(_) | Self::OperationAlreadyRegistered(_) => {
                ErrorClass::InvariantViolation
            }
            Self::BadProxyToken(_) | Self::BadOperationToken(_) => ErrorClass::Unsupported,
        }
    }
}

impl From<SchemaRegistryError> for InternalError {
    fn from(err: SchemaRegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Schema, err.to_string())
    }
}

///
/// MethodFn
///
/// The bound implementation of one service operation. Receives the
/// receiver instance for instance methods and the decoded arguments in
/// declaration order. A returned [`DomainError`] becomes a
/// per-invocation failure; it never aborts the surrounding batch.
///

pub type MethodFn =
    Box<dyn Fn(Option<DomainPtr>, Vec<DomainValue>) -> Result<DomainValue, DomainError> + Send + Sync>;

///
/// EntityBinding
///
/// One registered proxy type: its static model plus the locator that
/// bridges to the backing data store.
///

pub struct EntityBinding {
    pub model: &'static EntityModel,
    pub locator: Box<dyn EntityLocator>,
}

impl std::fmt::Debug for EntityBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityBinding")
            .field("proxy_token", &self.model.proxy_token)
            .finish_non_exhaustive()
    }
}

///
/// MethodBinding
///

pub struct MethodBinding {
    pub model: &'static MethodModel,
    pub invoke: MethodFn,
}

impl std::fmt::Debug for MethodBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBinding")
            .field("operation", &self.model.operation)
            .finish_non_exhaustive()
    }
}

///
/// SchemaRegistry
///
/// The statically-declared mapping tables binding proxy tokens to
/// entity models/locators and operation tokens to domain methods.
/// Built once at startup via [`SchemaBuilder`]; immutable afterwards.
///

pub struct SchemaRegistry {
    entities: Vec<EntityBinding>,
    entities_by_token: HashMap<&'static str, usize>,
    entities_by_domain: HashMap<&'static str, usize>,
    methods: Vec<MethodBinding>,
    methods_by_operation: HashMap<&'static str, usize>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("entities", &self.entities)
            .field("entities_by_token", &self.entities_by_token)
            .field("entities_by_domain", &self.entities_by_domain)
            .field("methods", &self.methods)
            .field("methods_by_operation", &self.methods_by_operation)
            .finish()
    }
}

impl SchemaRegistry {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up an entity binding by proxy token.
    pub fn entity(&self, proxy_token: &str) -> Result<&EntityBinding, SchemaRegistryError> {
        self.entities_by_token
            .get(proxy_token)
            .map(|idx| &self.entities[*idx])
            .ok_or_else(|| SchemaRegistryError::EntityNotFound(proxy_token.to_string()))
    }

    /// Look up an entity binding by fully-qualified domain path.
    pub fn entity_for_domain(
        &self,
        domain_path: &str,
    ) -> Result<&EntityBinding, SchemaRegistryError> {
        self.entities_by_domain
            .get(domain_path)
            .map(|idx| &self.entities[*idx])
            .ok_or_else(|| SchemaRegistryError::DomainNotMapped(domain_path.to_string()))
    }

    /// Look up a method binding by operation token.
    pub fn method(&self, operation: &str) -> Result<&MethodBinding, SchemaRegistryError> {
        self.methods_by_operation
            .get(operation)
            .map(|idx| &self.methods[*idx])
            .ok_or_else(|| SchemaRegistryError::OperationNotFound(operation.to_string()))
    }

    /// Iterate registered entity bindings in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityBinding> {
        self.entities.iter()
    }

    /// Iterate registered method bindings in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodBinding> {
        self.methods.iter()
    }
}

///
/// SchemaBuilder
///
/// Accumulates bindings, then validates the whole schema in one pass
/// at [`build`](Self::build) time.
///

#[derive(Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityBinding>,
    methods: Vec<MethodBinding>,
}

impl SchemaBuilder {
    /// Register an entity binding.
    #[must_use]
    pub fn entity(
        mut self,
        model: &'static EntityModel,
        locator: impl EntityLocator + 'static,
    ) -> Self {
        self.entities.push(EntityBinding {
            model,
            locator: Box::new(locator),
        });
        self
    }

    /// Register a method binding.
    #[must_use]
    pub fn method(
        mut self,
        model: &'static MethodModel,
        invoke: impl Fn(Option<DomainPtr>, Vec<DomainValue>) -> Result<DomainValue, DomainError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.methods.push(MethodBinding {
            model,
            invoke: Box::new(invoke),
        });
        self
    }

    /// Index the bindings and run structural validation over the
    /// finished schema. Any conformance failure poisons its token and
    /// fails the build.
    pub fn build(self) -> Result<SchemaRegistry, InternalError> {
        let registry = self.build_unchecked()?;

        let mut validator = super::InterfaceValidator::new();
        validator.validate_registry(&registry)?;

        Ok(registry)
    }

    /// Index the bindings without running the interface validator.
    ///
    /// Token-level invariants (uniqueness, separator-free proxy
    /// tokens, well-formed operation names) are still enforced. Meant
    /// for validator tooling that wants to inspect a broken schema.
    pub fn build_unchecked(self) -> Result<SchemaRegistry, InternalError> {
        let mut entities_by_token = HashMap::new();
        let mut entities_by_domain = HashMap::new();
        for (idx, binding) in self.entities.iter().enumerate() {
            let token = binding.model.proxy_token;
            if token.contains('-') {
                return Err(SchemaRegistryError::BadProxyToken(token.to_string()).into());
            }
            if entities_by_token.insert(token, idx).is_some() {
                return Err(SchemaRegistryError::EntityAlreadyRegistered(token.to_string()).into());
            }
            entities_by_domain.insert(binding.model.domain_path, idx);
        }

        let mut methods_by_operation = HashMap::new();
        for (idx, binding) in self.methods.iter().enumerate() {
            let operation = binding.model.operation;
            if operation.split_once("::").is_none_or(|(s, m)| s.is_empty() || m.is_empty()) {
                return Err(SchemaRegistryError::BadOperationToken(operation.to_string()).into());
            }
            if methods_by_operation.insert(operation, idx).is_some() {
                return Err(
                    SchemaRegistryError::OperationAlreadyRegistered(operation.to_string()).into(),
                );
            }
        }

        Ok(SchemaRegistry {
            entities: self.entities,
            entities_by_token,
            entities_by_domain,
            methods: self.methods,
            methods_by_operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{ArtistStore, SongStore, demo_registry};
    use crate::{error::ErrorClass, model::MethodReceiver};

    #[test]
    fn registered_tokens_resolve() {
        let registry = demo_registry();
        let binding = registry
            .entity("demo.SongProxy")
            .expect("registered proxy token should resolve");
        assert_eq!(binding.model.domain_path, "demo::Song");

        let method = registry
            .method("SongService::findSong")
            .expect("registered operation should resolve");
        assert_eq!(method.model.receiver, MethodReceiver::Static);
    }

    #[test]
    fn unknown_operation_is_not_found() {
        let registry = demo_registry();
        let err = registry.method("SongService::missing").unwrap_err();
        assert!(matches!(err, SchemaRegistryError::OperationNotFound(_)));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn duplicate_entity_registration_is_rejected() {
        SongStore::reset();
        ArtistStore::reset();
        let err = SchemaRegistry::builder()
            .entity(crate::test_fixtures::Song::MODEL, SongStore)
            .entity(crate::test_fixtures::Song::MODEL, SongStore)
            .build()
            .unwrap_err();
        assert!(err.message.contains("already registered"));
    }

    #[test]
    fn dashed_proxy_token_is_rejected_at_build() {
        // Tokens ride inside the `<id>-<IS|NO>-<token>` wire encoding;
        // a dash would make them unparseable.
        let err = SchemaRegistry::builder()
            .entity(crate::test_fixtures::BadToken::MODEL, SongStore)
            .build()
            .unwrap_err();
        assert!(err.message.contains("must not contain '-'"));
    }
}
