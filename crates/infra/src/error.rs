//! Storage and coordinator error types.
//!
//! Two layers, mirroring where a failure originates:
//!
//! - [`StoreError`]: what a backend reports (constraint violations keep the
//!   name of the constraint that fired).
//! - [`SchemaError`]: what callers of the catalog / coordinators see. Storage
//!   violations are reclassified once, at the call site that knows which
//!   constraint it is guarding; anything left unclassified stays
//!   [`SchemaError::Store`] and is an internal fault.

use thiserror::Error;

use stockroom_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Backend failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unique(constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    pub fn foreign_key(constraint: impl Into<String>) -> Self {
        Self::ForeignKeyViolation {
            constraint: constraint.into(),
        }
    }

    /// Whether this error is a violation of the named constraint.
    pub fn violates(&self, name: &str) -> bool {
        match self {
            StoreError::UniqueViolation { constraint }
            | StoreError::ForeignKeyViolation { constraint } => constraint == name,
            _ => false,
        }
    }
}

/// Error returned by the attribute catalog, binding coordinator and type lifecycle.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Unresolved type, attribute or binding id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or disallowed request (shape, default value, duplicates, references).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Concurrent creation of the same canonical attribute could not be resolved.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unclassified storage failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SchemaError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code for outer layers (HTTP, CLI).
    pub fn error_code(&self) -> &'static str {
        match self {
            SchemaError::NotFound(_) => "not_found",
            SchemaError::BadRequest(_) => "bad_request",
            SchemaError::Conflict(_) => "conflict",
            SchemaError::Store(_) => "internal",
        }
    }
}

impl From<DomainError> for SchemaError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => SchemaError::BadRequest(msg),
            DomainError::NotFound(msg) => SchemaError::NotFound(msg),
            DomainError::Conflict(msg) => SchemaError::Conflict(msg),
        }
    }
}
