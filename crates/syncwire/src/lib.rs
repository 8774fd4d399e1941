//! Syncwire — a server-side entity-RPC resolution and delta-sync
//! engine.
//!
//! A syncwire server accepts batched JSON requests from clients that
//! hold typed proxies of server entities: a delta value store of
//! pending writes plus a list of method invocations. Processing one
//! request applies the deltas, gates on validation, invokes the bound
//! domain methods, resolves the returned object graphs back into
//! client form, and reports the side effects (creates, updates,
//! deletes) the client needs to keep its local cache consistent.
//!
//! ## Crate layout
//! - `core`: models, traits, schema registry, service stack, request
//!   state/resolver, processor, and wire envelopes.
//!
//! The `prelude` module mirrors the vocabulary used when declaring
//! entities and binding services.

pub use syncwire_core as core;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use syncwire_core::{
    domain_entity,
    error::{DomainError, InternalError},
    processor::{
        DefaultExceptionHandler, ExceptionHandler, ProcessorConfig, RequestProcessor,
    },
    schema::{SchemaBuilder, SchemaRegistry},
    service::{ServiceConfig, ServiceStack},
    wire::{RequestEnvelope, ResponseEnvelope, ServerFailure},
};

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use syncwire_core::prelude::*;
    pub use syncwire_core::{Ulid, domain_entity};
}
