use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::Key,
    model::EntityModel,
    value::{Value, ValueKind},
};
use std::{cell::RefCell, fmt, rc::Rc};
use thiserror::Error as ThisError;
use ulid::Ulid;

///
/// Path
/// Fully-qualified domain type path.
///

pub trait Path {
    const PATH: &'static str;
}

///
/// DomainPtr
///
/// Shared handle to a materialized domain object. Request processing
/// is single-threaded (one fresh state per request), so interior
/// mutability via `RefCell` is the ownership model: the request state,
/// the resolver, and invoked domain methods all hold the same
/// instance.
///

pub type DomainPtr = Rc<RefCell<dyn DomainObject>>;

/// Wrap a concrete domain object into a shared handle.
pub fn domain_ptr<T: DomainObject + 'static>(obj: T) -> DomainPtr {
    Rc::new(RefCell::new(obj))
}

///
/// DomainValue
///
/// What flows through domain getters, setters, and method
/// invocations: scalars, entity handles, or collections of either.
/// `Set` preserves the declared collection kind through resolution so
/// the client receives the same shape it requested.
///

#[derive(Clone)]
pub enum DomainValue {
    Null,
    Value(Value),
    Entity(DomainPtr),
    List(Vec<DomainValue>),
    Set(Vec<DomainValue>),
}

impl DomainValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Entity(e) => {
                let token = e.borrow().model().proxy_token;
                f.debug_tuple("Entity").field(&token).finish()
            }
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
        }
    }
}

impl From<Value> for DomainValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Value(other),
        }
    }
}

///
/// PropertyError
///
/// Raised by typed accessors when a property name or value shape does
/// not match the declared model. Always a mapping bug between client
/// and domain types, so it escalates to a fatal request failure.
///

#[derive(Debug, ThisError)]
pub enum PropertyError {
    #[error("entity '{entity}' has no property '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("property '{field}' expects {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: String,
    },
}

impl PropertyError {
    /// An access to a field the model does not declare.
    pub fn unknown(entity: &str, field: &str) -> Self {
        Self::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    /// A value whose shape does not fit the declared field.
    pub fn mismatch(field: &str, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            field: field.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<PropertyError> for InternalError {
    fn from(err: PropertyError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Schema, err.to_string())
    }
}

///
/// DomainObject
///
/// The statically-declared accessor surface of one domain entity:
/// property get/set by declared field name, plus id and version
/// probes. `None` from [`id`](Self::id) or [`version`](Self::version)
/// signals "not yet persisted".
///

pub trait DomainObject: ValidateAuto + ValidateCustom {
    fn model(&self) -> &'static EntityModel;

    fn get(&self, field: &str) -> Result<DomainValue, PropertyError>;

    fn set(&mut self, field: &str, value: DomainValue) -> Result<(), PropertyError>;

    fn id(&self) -> Option<Key>;

    fn version(&self) -> Option<u64> {
        None
    }
}

///
/// Issue
/// One non-fatal validation finding, pinned to a property path.
///

#[derive(Clone, Debug)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

///
/// IssueSink
/// Collects validation issues during a visit.
///

#[derive(Debug, Default)]
pub struct IssueSink {
    issues: Vec<Issue>,
}

impl IssueSink {
    #[must_use]
    pub const fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn issue(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            path: path.into(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

///
/// ValidateAuto
///
/// Model-level checks generated alongside the entity declaration.
///

pub trait ValidateAuto {
    fn validate_auto(&self, _ctx: &mut IssueSink) {}
}

///
/// ValidateCustom
///
/// Domain checks written by hand. The default produces no issues, so
/// a type without custom rules simply never fails validation.
///

pub trait ValidateCustom {
    fn validate_custom(&self, _ctx: &mut IssueSink) {}
}

/// Validate one domain object, collecting issues by path.
pub fn validate(obj: &dyn DomainObject) -> Vec<Issue> {
    let mut sink = IssueSink::new();
    obj.validate_auto(&mut sink);
    obj.validate_custom(&mut sink);

    sink.into_issues()
}

///
/// EntityLocator
///
/// The capability seam between the engine and the backing data store:
/// construct, load, and liveness-probe domain objects of one type.
/// The default liveness probe is a load; locators with a cheaper
/// existence check may override it.
///

pub trait EntityLocator: Send + Sync {
    fn create(&self) -> Result<DomainPtr, InternalError>;

    fn load(&self, key: &Key) -> Result<Option<DomainPtr>, InternalError>;

    fn is_live(&self, key: &Key) -> Result<bool, InternalError> {
        Ok(self.load(key)?.is_some())
    }
}

///
/// FieldValue
///
/// Conversion boundary between native field storage types and wire
/// scalar values. Implemented for every type the entity macro may
/// declare as field storage.
///

pub trait FieldValue: Sized {
    fn kind() -> ValueKind;

    fn to_value(&self) -> Value;

    #[must_use]
    fn from_value(value: &Value) -> Option<Self>;
}

// impl_field_value
macro_rules! impl_field_value {
    ( $( $type:ty => $variant:ident / $kind:ident ),* $(,)? ) => {
        $(
            impl FieldValue for $type {
                fn kind() -> ValueKind {
                    ValueKind::$kind
                }

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_field_value!(
    bool => Bool / Bool,
    i64 => Int / Int,
    u64 => Uint / Uint,
    f64 => Float / Float,
    String => Text / Text,
    Ulid => Ulid / Ulid,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_round_trips() {
        let v = 42u64.to_value();
        assert_eq!(u64::from_value(&v), Some(42));
        assert_eq!(u64::from_value(&Value::Text("42".into())), None);
    }

    #[test]
    fn issue_sink_collects_in_order() {
        let mut sink = IssueSink::new();
        sink.issue("title", "must not be empty");
        sink.issue("plays", "must be non-negative");

        let issues = sink.into_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, "title");
        assert_eq!(issues[1].message, "must be non-negative");
    }
}
