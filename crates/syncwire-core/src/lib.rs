//! Core runtime for Syncwire: entity models and traits, the schema
//! registry, the service stack, request state and resolver, and the
//! request processor with its JSON wire envelopes.
#![warn(unreachable_pub)]

#[macro_use]
pub mod macros;

// public exports are one module level down
pub mod error;
pub mod key;
pub mod model;
pub mod processor;
pub mod schema;
pub mod service;
pub mod state;
pub mod traits;
pub mod value;
pub mod wire;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-exported for the entity declaration macros.
pub use ulid::Ulid;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No processors, registries, or wire types are re-exported here.
///

pub mod prelude {
    pub use crate::{
        key::{EntityKey, Key, KeyKind},
        model::{EntityModel, FieldShape, MethodModel, MethodReceiver, ParamShape, ReturnShape},
        traits::{
            DomainObject, DomainPtr, DomainValue, EntityLocator, IssueSink, Path, ValidateAuto,
            ValidateCustom, domain_ptr,
        },
        value::{Value, ValueKind},
    };
}
