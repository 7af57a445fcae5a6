//! Referential integrity checks for cross-entity writes.
//!
//! Two point predicates guard the write path, both against authoritative
//! handles (an integrity decision must never be made on lagging data):
//!
//! - a product create/update requires its `category_id` to name an
//!   existing category;
//! - a category delete requires that no product references it.
//!
//! These checks run only on the node originating the write. Replicas
//! applying a remote event skip them by design: the origin already
//! validated, and replicas must stay convergent even if the referenced
//! category was deleted elsewhere in the meantime.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{Category, Product};
use crate::store::DocumentStore;

/// Validates cross-entity preconditions against authoritative stores.
#[derive(Clone)]
pub struct IntegrityValidator {
    categories: Arc<dyn DocumentStore<Category>>,
    products: Arc<dyn DocumentStore<Product>>,
}

impl IntegrityValidator {
    /// Both handles must be authoritative.
    pub fn new(
        categories: Arc<dyn DocumentStore<Category>>,
        products: Arc<dyn DocumentStore<Product>>,
    ) -> Self {
        Self {
            categories,
            products,
        }
    }

    /// Whether a category with this id exists (authoritative lookup).
    pub async fn category_exists(&self, category_id: &str) -> Result<bool> {
        Ok(self.categories.get(category_id).await?.is_some())
    }

    /// Whether any product still references this category.
    pub async fn category_in_use(&self, category_id: &str) -> Result<bool> {
        let category_id = category_id.to_string();
        Ok(self
            .products
            .any_match(&move |p: &Product| p.category_id == category_id)
            .await?)
    }
}
