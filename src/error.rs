//! Error types for the catalog replication core.
//!
//! Errors are categorized by where they surface: origin-side write
//! validation, local store access, bus publication, or consumer-side
//! event handling.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Integrity` | No | Cross-entity precondition failed; user-correctable |
//! | `NotFound` | No | Mutation targeted an id that does not exist locally |
//! | `Validation` | No | Field-level validation failed at the origin |
//! | `Store` | Yes | Local document store temporarily unavailable |
//! | `Publish` | Yes | Bus publish failed; the whole write is aborted |
//! | `EventParse` | No | Malformed event payload from the bus |
//! | `Config` | No | Invalid node configuration |
//! | `Shutdown` | No | Node is shutting down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`CatalogError::is_retryable()`] to decide whether an operation
//! should be retried with backoff. The consumer retries retryable apply
//! failures and dead-letters the rest; the write path surfaces transient
//! errors to the caller without leaving partial effects.
//!
//! Note the absence of a duplicate-key variant here: a duplicate-key
//! conflict during replica apply means convergence was already achieved
//! and is collapsed into success inside the consumer, never surfaced
//! (it exists only as [`StoreError::DuplicateKey`](crate::store::StoreError)).

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur in the catalog write path and consumers.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Referential integrity violation.
    ///
    /// A product referenced a missing category, or a category delete was
    /// blocked by dependent products. Surfaced verbatim to the caller;
    /// no side effects were performed. Not retryable.
    #[error("Integrity error: {message}")]
    Integrity {
        /// The offending entity id (missing category, or blocked category).
        entity_id: String,
        message: String,
    },

    /// A mutation targeted an id with no local record.
    #[error("Not found: {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// Origin-side field validation failure (empty name, negative price).
    ///
    /// User-correctable; no side effects were performed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local document store failure.
    ///
    /// Retryable - the store may be temporarily unavailable. Duplicate-key
    /// conflicts are *not* retryable; the consumer treats them as success.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bus publish failure.
    ///
    /// Retryable. The write path compensates the local write when this
    /// happens, so the operation as a whole had no effect.
    #[error("Publish error ({exchange}): {message}")]
    Publish { exchange: String, message: String },

    /// Malformed event payload received from the bus.
    ///
    /// Not retryable - the payload is corrupt at the source and goes to
    /// the dead-letter queue immediately.
    #[error("Event parse error: {0}")]
    EventParse(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Create an integrity error for a missing category reference.
    pub fn missing_category(category_id: impl Into<String>) -> Self {
        let entity_id = category_id.into();
        Self::Integrity {
            message: format!("referenced category '{entity_id}' does not exist"),
            entity_id,
        }
    }

    /// Create an integrity error for a delete blocked by dependent products.
    pub fn category_in_use(category_id: impl Into<String>) -> Self {
        let entity_id = category_id.into();
        Self::Integrity {
            message: format!(
                "cannot delete category '{entity_id}': products still reference it"
            ),
            entity_id,
        }
    }

    /// Create a publish error.
    pub fn publish(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Publish { .. } => true,
            Self::Integrity { .. } => false,
            Self::NotFound { .. } => false,
            Self::Validation(_) => false,
            Self::EventParse(_) => false,
            Self::Config(_) => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }
}
