//! Catalog entities.
//!
//! Two entity kinds replicate across the fleet: [`Category`] and
//! [`Product`]. Each record carries a `last_changed` logical timestamp,
//! stamped by the node performing the mutation. The timestamp travels on
//! change events but is not used for conflict resolution: replica apply
//! is last-delivered-wins.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CatalogError, Result};

/// A product grouping. Categories are the "parent" entity: products hold
/// a foreign key into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier, assigned by the creating node, globally unique.
    pub id: String,
    /// Non-empty display name.
    pub name: String,
    pub description: Option<String>,
    /// Logical timestamp of the last mutation.
    pub last_changed: DateTime<Utc>,
}

impl Category {
    /// Create a category with a freshly assigned id.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            description,
            last_changed: Utc::now(),
        }
    }

    /// Origin-side field validation. Replicas never call this: they trust
    /// the originating node and must stay convergent regardless.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation(
                "category name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A sellable item referencing its [`Category`] by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable identifier, assigned by the creating node, globally unique.
    pub id: String,
    /// Non-empty display name.
    pub name: String,
    /// Non-negative price.
    pub price: Decimal,
    /// Foreign key into `Category`. Checked only on the node originating
    /// the write; replicas apply without re-validation.
    pub category_id: String,
    /// Logical timestamp of the last mutation.
    pub last_changed: DateTime<Utc>,
}

impl Product {
    /// Create a product with a freshly assigned id.
    pub fn new(
        name: impl Into<String>,
        price: Decimal,
        category_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            price,
            category_id: category_id.into(),
            last_changed: Utc::now(),
        }
    }

    /// Origin-side field validation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation(
                "product name must not be empty".into(),
            ));
        }
        if self.price.is_sign_negative() {
            return Err(CatalogError::Validation(format!(
                "product price must be non-negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// The replicated entity kinds. Each kind gets its own broadcast exchange
/// and its own consumer task per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Product,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Product => "product",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh entity id.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_category_gets_unique_ids() {
        let a = Category::new("Laptops", None);
        let b = Category::new("Laptops", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn category_empty_name_rejected() {
        let mut cat = Category::new("Laptops", Some("portable computers".into()));
        assert!(cat.validate().is_ok());

        cat.name = "   ".into();
        assert!(matches!(cat.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn product_negative_price_rejected() {
        let mut product = Product::new("Keyboard", dec!(49.99), "c1");
        assert!(product.validate().is_ok());

        product.price = dec!(-0.01);
        let err = product.validate().unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn product_zero_price_allowed() {
        let product = Product::new("Sticker", dec!(0), "c1");
        assert!(product.validate().is_ok());
    }

    #[test]
    fn product_serde_roundtrip_preserves_decimal() {
        let product = Product::new("Monitor", dec!(199.90), "c1");
        let json = serde_json::to_string(&product).unwrap();
        let parsed: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, product);
        assert_eq!(parsed.price, dec!(199.90));
    }

    #[test]
    fn entity_kind_display() {
        assert_eq!(EntityKind::Category.to_string(), "category");
        assert_eq!(EntityKind::Product.to_string(), "product");
    }
}
