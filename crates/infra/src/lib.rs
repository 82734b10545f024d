//! Storage and orchestration for the attribute schema: store backends, the
//! attribute catalog, binding coordinator, type lifecycle and cascade.

pub mod bindings;
pub mod cascade;
pub mod catalog;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use bindings::BindingCoordinator;
pub use cascade::CascadeCoordinator;
pub use catalog::AttributeCatalog;
pub use config::{StoreConfig, StoreConfigError};
pub use error::{SchemaError, SchemaResult, StoreError, StoreResult};
pub use store::{InMemorySchemaStore, PostgresSchemaStore, SchemaStore, SchemaTx};
pub use types::TypeLifecycle;
