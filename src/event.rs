//! Change event schema.
//!
//! Events are immutable facts describing a completed mutation, not
//! commands. One tagged sum type per entity kind replaces per-verb
//! message classes; consumers dispatch on the variant.
//!
//! A Create/Update event carries the full entity snapshot plus the
//! `last_changed` logical timestamp; a Delete event carries only the id.
//! Product events carry `category_id` on both Created and Updated so a
//! category reassignment replicates and a replica can reconstruct the
//! full entity when upserting a record it has never seen.
//!
//! # Wire format
//!
//! JSON with an internal `"type"` tag:
//!
//! ```json
//! {"type":"created","id":"c1","name":"Laptops","description":null,"last_changed":"2026-08-30T12:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::model::{Category, Product};

/// Broadcast exchange for category events.
pub const CATEGORY_EXCHANGE: &str = "catalog.category";

/// Broadcast exchange for product events.
pub const PRODUCT_EXCHANGE: &str = "catalog.product";

/// A change event for the `Category` entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CategoryEvent {
    Created {
        id: String,
        name: String,
        description: Option<String>,
        last_changed: DateTime<Utc>,
    },
    Updated {
        id: String,
        name: String,
        description: Option<String>,
        last_changed: DateTime<Utc>,
    },
    Deleted {
        id: String,
    },
}

impl CategoryEvent {
    /// Build a Created event from an entity snapshot.
    pub fn created(category: &Category) -> Self {
        Self::Created {
            id: category.id.clone(),
            name: category.name.clone(),
            description: category.description.clone(),
            last_changed: category.last_changed,
        }
    }

    /// Build an Updated event from an entity snapshot.
    pub fn updated(category: &Category) -> Self {
        Self::Updated {
            id: category.id.clone(),
            name: category.name.clone(),
            description: category.description.clone(),
            last_changed: category.last_changed,
        }
    }

    /// Build a Deleted event. Carries only the identifier.
    pub fn deleted(id: impl Into<String>) -> Self {
        Self::Deleted { id: id.into() }
    }

    /// The id of the entity this event is about.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Created { id, .. } | Self::Updated { id, .. } | Self::Deleted { id } => id,
        }
    }

    /// Verb name for logs and metrics.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// A change event for the `Product` entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created {
        id: String,
        name: String,
        price: Decimal,
        category_id: String,
        last_changed: DateTime<Utc>,
    },
    Updated {
        id: String,
        name: String,
        price: Decimal,
        category_id: String,
        last_changed: DateTime<Utc>,
    },
    Deleted {
        id: String,
    },
}

impl ProductEvent {
    /// Build a Created event from an entity snapshot.
    pub fn created(product: &Product) -> Self {
        Self::Created {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            category_id: product.category_id.clone(),
            last_changed: product.last_changed,
        }
    }

    /// Build an Updated event from an entity snapshot.
    pub fn updated(product: &Product) -> Self {
        Self::Updated {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            category_id: product.category_id.clone(),
            last_changed: product.last_changed,
        }
    }

    /// Build a Deleted event. Carries only the identifier.
    pub fn deleted(id: impl Into<String>) -> Self {
        Self::Deleted { id: id.into() }
    }

    /// The id of the entity this event is about.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Created { id, .. } | Self::Updated { id, .. } | Self::Deleted { id } => id,
        }
    }

    /// Verb name for logs and metrics.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// Encode an event for the bus.
pub fn encode<E: Serialize>(event: &E) -> Result<Vec<u8>> {
    serde_json::to_vec(event).map_err(|e| CatalogError::Internal(e.to_string()))
}

/// Decode an event payload received from the bus.
///
/// Failures are [`CatalogError::EventParse`] and are never retried.
pub fn decode<E: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<E> {
    serde_json::from_slice(payload).map_err(|e| CatalogError::EventParse(e.to_string()))
}
