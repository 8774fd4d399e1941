use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Anything carrying this type aborts the current request and is
/// surfaced to the client as a general-failure envelope.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    /// Construct an error with an explicit class and origin.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a decode-origin unsupported error.
    pub(crate) fn decode_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Decode, message)
    }

    /// Construct a decode-origin invariant violation.
    pub(crate) fn decode_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Decode, message)
    }

    /// Construct a schema-origin not-found error.
    pub(crate) fn schema_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Schema, message)
    }

    /// Construct a schema-origin unsupported error.
    pub(crate) fn schema_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Schema, message)
    }

    /// Construct a state-origin invariant violation.
    pub(crate) fn state_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::State, message)
    }

    /// Construct a resolver-origin unsupported error.
    pub(crate) fn resolver_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Resolver, message)
    }

    /// Construct a processor-origin invariant violation.
    pub(crate) fn processor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Processor,
            message,
        )
    }

    #[must_use]
    pub const fn is_dead_entity(&self) -> bool {
        matches!(self.class, ErrorClass::DeadEntity)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
    DeadEntity,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::DeadEntity => "dead_entity",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Decode,
    Schema,
    Service,
    State,
    Resolver,
    Processor,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Decode => "decode",
            Self::Schema => "schema",
            Self::Service => "service",
            Self::State => "state",
            Self::Resolver => "resolver",
            Self::Processor => "processor",
        };
        write!(f, "{label}")
    }
}

///
/// DomainError
///
/// A failure raised by an invoked domain method. Never aborts the
/// request; converted into a per-invocation failure slot by the
/// configured exception handler.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct DomainError {
    pub type_name: String,
    pub message: String,
}

impl DomainError {
    /// Construct a domain failure with an explicit type name.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Construct a domain failure with no specific type classification.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("DomainError", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_class_includes_origin_and_class() {
        let err = InternalError::schema_not_found("operation 'X::y' not found");
        assert_eq!(
            err.display_with_class(),
            "schema:not_found: operation 'X::y' not found"
        );
    }

    #[test]
    fn dead_entity_classification_is_observable() {
        let err = InternalError::new(
            ErrorClass::DeadEntity,
            ErrorOrigin::Resolver,
            "the requested entity is not available on the server",
        );
        assert!(err.is_dead_entity());
        assert!(!InternalError::state_invariant("x").is_dead_entity());
    }
}
