//! Catalog services: the origin-side write path.
//!
//! One service per entity kind composes validation, integrity checks,
//! local persistence and event publication into single operations. Reads
//! go through the [`ReadRouter`]; writes always target the authoritative
//! handle.
//!
//! # Write ordering
//!
//! Every successful mutation performs exactly one local store write and
//! exactly one bus publish, in that causal order: **write first, publish
//! second**. Publishing before the local write could broadcast an event
//! for a write that later fails; writing without managing a failed
//! publish would silently desynchronize the fleet. So when the publish
//! fails, the service restores the pre-image of the local record (or
//! deletes a fresh insert) and fails the whole operation - both side
//! effects happen, or neither is considered successful.
//!
//! # Integrity
//!
//! Product writes check their category reference and category deletes
//! check for dependent products *before* any side effect, against
//! authoritative state. A failed check aborts with
//! [`CatalogError::Integrity`] and performs no write and no publish.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::bus::{BusError, EventBus};
use crate::error::{CatalogError, Result};
use crate::event::{self, CategoryEvent, ProductEvent, CATEGORY_EXCHANGE, PRODUCT_EXCHANGE};
use crate::integrity::IntegrityValidator;
use crate::metrics;
use crate::model::{Category, Product};
use crate::router::{ReadRouter, StoreHandles};

/// Encode and broadcast an event, mapping bus failures to
/// [`CatalogError::Publish`].
async fn publish_event<E: Serialize>(
    bus: &dyn EventBus,
    exchange: &str,
    origin: &str,
    event: &E,
) -> Result<()> {
    let payload = event::encode(event)?;
    bus.publish(exchange, origin, payload)
        .await
        .map_err(|BusError::Unavailable(msg)| {
            metrics::record_publish_failure(exchange);
            CatalogError::publish(exchange, msg)
        })
}

/// Category orchestration: create/read/update/delete with broadcast.
#[derive(Clone)]
pub struct CategoryService {
    node_id: String,
    handles: StoreHandles<Category>,
    router: ReadRouter<Category>,
    validator: IntegrityValidator,
    bus: Arc<dyn EventBus>,
}

impl CategoryService {
    pub fn new(
        node_id: String,
        handles: StoreHandles<Category>,
        validator: IntegrityValidator,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let router = ReadRouter::new(handles.clone());
        Self {
            node_id,
            handles,
            router,
            validator,
            bus,
        }
    }

    /// Listing read, served by the follower-preferred handle.
    pub async fn get_all(&self) -> Result<Vec<Category>> {
        self.router.get_all().await
    }

    /// Consistent point read, served by the authoritative handle.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Category>> {
        self.router.get_by_id(id).await
    }

    /// Create a category locally and broadcast the fact.
    pub async fn create(&self, mut category: Category) -> Result<Category> {
        category.validate()?;
        category.last_changed = Utc::now();

        self.handles.authoritative.insert(category.clone()).await?;

        let event = CategoryEvent::created(&category);
        if let Err(publish_err) =
            publish_event(&*self.bus, CATEGORY_EXCHANGE, &self.node_id, &event).await
        {
            // Undo the local insert so no state survives without its broadcast.
            if let Err(rollback_err) = self.handles.authoritative.delete(&category.id).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %category.id,
                    error = %rollback_err,
                    "failed to roll back category insert after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %category.id, "category created");
        metrics::record_write("category", "created");
        Ok(category)
    }

    /// Update a category. The path id wins over any id in the body.
    pub async fn update(&self, id: &str, mut category: Category) -> Result<Category> {
        category.id = id.to_string();
        category.validate()?;

        let pre_image = self
            .handles
            .authoritative
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: "category",
                id: id.to_string(),
            })?;

        category.last_changed = Utc::now();
        if !self.handles.authoritative.replace(category.clone()).await? {
            // Deleted between the guard read and the replace.
            return Err(CatalogError::NotFound {
                kind: "category",
                id: id.to_string(),
            });
        }

        let event = CategoryEvent::updated(&category);
        if let Err(publish_err) =
            publish_event(&*self.bus, CATEGORY_EXCHANGE, &self.node_id, &event).await
        {
            if let Err(rollback_err) = self.handles.authoritative.upsert(pre_image).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %id,
                    error = %rollback_err,
                    "failed to restore category pre-image after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %id, "category updated");
        metrics::record_write("category", "updated");
        Ok(category)
    }

    /// Delete a category, blocked while any product references it.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let pre_image = self
            .handles
            .authoritative
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: "category",
                id: id.to_string(),
            })?;

        if self.validator.category_in_use(id).await? {
            metrics::record_integrity_rejection("category");
            return Err(CatalogError::category_in_use(id));
        }

        self.handles.authoritative.delete(id).await?;

        let event = CategoryEvent::deleted(id);
        if let Err(publish_err) =
            publish_event(&*self.bus, CATEGORY_EXCHANGE, &self.node_id, &event).await
        {
            if let Err(rollback_err) = self.handles.authoritative.upsert(pre_image).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %id,
                    error = %rollback_err,
                    "failed to restore category after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %id, "category removed");
        metrics::record_write("category", "deleted");
        Ok(())
    }
}

/// Product orchestration: create/read/update/delete with broadcast and
/// category reference validation.
#[derive(Clone)]
pub struct ProductService {
    node_id: String,
    handles: StoreHandles<Product>,
    router: ReadRouter<Product>,
    validator: IntegrityValidator,
    bus: Arc<dyn EventBus>,
}

impl ProductService {
    pub fn new(
        node_id: String,
        handles: StoreHandles<Product>,
        validator: IntegrityValidator,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let router = ReadRouter::new(handles.clone());
        Self {
            node_id,
            handles,
            router,
            validator,
            bus,
        }
    }

    /// Listing read, served by the follower-preferred handle.
    pub async fn get_all(&self) -> Result<Vec<Product>> {
        self.router.get_all().await
    }

    /// Consistent point read, served by the authoritative handle.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Product>> {
        self.router.get_by_id(id).await
    }

    /// Create a product locally and broadcast the fact.
    ///
    /// The category reference is validated against the authoritative
    /// category store first; a missing category aborts with an integrity
    /// error before any side effect.
    pub async fn create(&self, mut product: Product) -> Result<Product> {
        product.validate()?;

        if !self.validator.category_exists(&product.category_id).await? {
            metrics::record_integrity_rejection("product");
            debug!(
                node_id = %self.node_id,
                entity_id = %product.id,
                category_id = %product.category_id,
                "product create rejected: missing category"
            );
            return Err(CatalogError::missing_category(&product.category_id));
        }

        product.last_changed = Utc::now();
        self.handles.authoritative.insert(product.clone()).await?;

        let event = ProductEvent::created(&product);
        if let Err(publish_err) =
            publish_event(&*self.bus, PRODUCT_EXCHANGE, &self.node_id, &event).await
        {
            if let Err(rollback_err) = self.handles.authoritative.delete(&product.id).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %product.id,
                    error = %rollback_err,
                    "failed to roll back product insert after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %product.id, "product created");
        metrics::record_write("product", "created");
        Ok(product)
    }

    /// Update a product. The path id wins over any id in the body, and
    /// the category reference is re-validated - it may have changed.
    pub async fn update(&self, id: &str, mut product: Product) -> Result<Product> {
        product.id = id.to_string();
        product.validate()?;

        if !self.validator.category_exists(&product.category_id).await? {
            metrics::record_integrity_rejection("product");
            return Err(CatalogError::missing_category(&product.category_id));
        }

        let pre_image = self
            .handles
            .authoritative
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: "product",
                id: id.to_string(),
            })?;

        product.last_changed = Utc::now();
        if !self.handles.authoritative.replace(product.clone()).await? {
            return Err(CatalogError::NotFound {
                kind: "product",
                id: id.to_string(),
            });
        }

        let event = ProductEvent::updated(&product);
        if let Err(publish_err) =
            publish_event(&*self.bus, PRODUCT_EXCHANGE, &self.node_id, &event).await
        {
            if let Err(rollback_err) = self.handles.authoritative.upsert(pre_image).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %id,
                    error = %rollback_err,
                    "failed to restore product pre-image after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %id, "product updated");
        metrics::record_write("product", "updated");
        Ok(product)
    }

    /// Delete a product unconditionally and broadcast the fact.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let pre_image = self
            .handles
            .authoritative
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: "product",
                id: id.to_string(),
            })?;

        self.handles.authoritative.delete(id).await?;

        let event = ProductEvent::deleted(id);
        if let Err(publish_err) =
            publish_event(&*self.bus, PRODUCT_EXCHANGE, &self.node_id, &event).await
        {
            if let Err(rollback_err) = self.handles.authoritative.upsert(pre_image).await {
                error!(
                    node_id = %self.node_id,
                    entity_id = %id,
                    error = %rollback_err,
                    "failed to restore product after publish failure"
                );
            }
            return Err(publish_err);
        }

        info!(node_id = %self.node_id, entity_id = %id, "product removed");
        metrics::record_write("product", "deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::store::{DocumentStore, InMemoryStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        categories: Arc<InMemoryStore<Category>>,
        products: Arc<InMemoryStore<Product>>,
        bus: Arc<InMemoryBus>,
        category_service: CategoryService,
        product_service: ProductService,
    }

    fn fixture() -> Fixture {
        let categories = Arc::new(InMemoryStore::new());
        let products = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());

        let validator = IntegrityValidator::new(
            Arc::clone(&categories) as Arc<dyn DocumentStore<Category>>,
            Arc::clone(&products) as Arc<dyn DocumentStore<Product>>,
        );

        let category_service = CategoryService::new(
            "node-a".into(),
            StoreHandles::single(Arc::clone(&categories) as Arc<dyn DocumentStore<Category>>),
            validator.clone(),
            Arc::clone(&bus) as Arc<dyn EventBus>,
        );
        let product_service = ProductService::new(
            "node-a".into(),
            StoreHandles::single(Arc::clone(&products) as Arc<dyn DocumentStore<Product>>),
            validator,
            Arc::clone(&bus) as Arc<dyn EventBus>,
        );

        Fixture {
            categories,
            products,
            bus,
            category_service,
            product_service,
        }
    }

    #[tokio::test]
    async fn create_writes_locally_then_publishes() {
        let fx = fixture();
        let mut observer = fx
            .bus
            .bind_queue(CATEGORY_EXCHANGE, "observer")
            .await
            .unwrap();

        let created = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();

        assert!(fx.categories.get(&created.id).await.unwrap().is_some());

        let delivery = observer.recv().await.unwrap();
        assert_eq!(delivery.origin, "node-a");
        let event: CategoryEvent = event::decode(&delivery.payload).unwrap();
        assert_eq!(event.entity_id(), created.id);
        assert_eq!(event.verb(), "created");
    }

    #[tokio::test]
    async fn product_create_with_missing_category_has_no_effects() {
        let fx = fixture();
        let mut observer = fx
            .bus
            .bind_queue(PRODUCT_EXCHANGE, "observer")
            .await
            .unwrap();

        let mut product = Product::new("Keyboard", dec!(49.99), "missing");
        product.id = "p1".into();
        let err = fx.product_service.create(product).await.unwrap_err();

        assert!(matches!(err, CatalogError::Integrity { .. }));
        assert!(err.to_string().contains("missing"));
        assert!(fx.products.is_empty().await);
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn blocked_category_delete_leaves_category_and_publishes_nothing() {
        let fx = fixture();

        let category = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();
        fx.product_service
            .create(Product::new("Keyboard", dec!(49.99), &category.id))
            .await
            .unwrap();

        let mut observer = fx
            .bus
            .bind_queue(CATEGORY_EXCHANGE, "observer")
            .await
            .unwrap();

        let err = fx.category_service.remove(&category.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::Integrity { .. }));

        assert!(fx.categories.get(&category.id).await.unwrap().is_some());
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreferenced_category_delete_succeeds_and_broadcasts() {
        let fx = fixture();
        let category = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();

        let mut observer = fx
            .bus
            .bind_queue(CATEGORY_EXCHANGE, "observer")
            .await
            .unwrap();

        fx.category_service.remove(&category.id).await.unwrap();
        assert!(fx.categories.get(&category.id).await.unwrap().is_none());

        let event: CategoryEvent = event::decode(&observer.recv().await.unwrap().payload).unwrap();
        assert_eq!(event, CategoryEvent::deleted(category.id));
    }

    #[tokio::test]
    async fn update_overwrites_id_from_path_parameter() {
        let fx = fixture();
        let created = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();

        // Body claims a different id; the path parameter must win.
        let mut body = created.clone();
        body.id = "spoofed".into();
        body.name = "Notebooks".into();

        let updated = fx.category_service.update(&created.id, body).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(
            fx.categories.get(&created.id).await.unwrap().unwrap().name,
            "Notebooks"
        );
        assert!(fx.categories.get("spoofed").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let fx = fixture();
        let err = fx
            .category_service
            .update("ghost", Category::new("Laptops", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn remove_missing_is_not_found() {
        let fx = fixture();
        let err = fx.product_service.remove("ghost").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn publish_failure_rolls_back_create() {
        let fx = fixture();
        fx.bus.fail_next(1);

        let mut category = Category::new("Laptops", None);
        category.id = "c1".into();
        let err = fx.category_service.create(category).await.unwrap_err();

        assert!(matches!(err, CatalogError::Publish { .. }));
        assert!(err.is_retryable());
        // Neither side effect survived.
        assert!(fx.categories.get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_failure_restores_update_pre_image() {
        let fx = fixture();
        let created = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();

        fx.bus.fail_next(1);
        let mut changed = created.clone();
        changed.name = "Notebooks".into();
        let err = fx
            .category_service
            .update(&created.id, changed)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Publish { .. }));
        let stored = fx.categories.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Laptops");
        assert_eq!(stored.last_changed, created.last_changed);
    }

    #[tokio::test]
    async fn publish_failure_restores_removed_product() {
        let fx = fixture();
        let category = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();
        let product = fx
            .product_service
            .create(Product::new("Keyboard", dec!(49.99), &category.id))
            .await
            .unwrap();

        fx.bus.fail_next(1);
        let err = fx.product_service.remove(&product.id).await.unwrap_err();

        assert!(matches!(err, CatalogError::Publish { .. }));
        assert!(fx.products.get(&product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn product_update_revalidates_category_reference() {
        let fx = fixture();
        let category = fx
            .category_service
            .create(Category::new("Laptops", None))
            .await
            .unwrap();
        let product = fx
            .product_service
            .create(Product::new("Keyboard", dec!(49.99), &category.id))
            .await
            .unwrap();

        let mut reassigned = product.clone();
        reassigned.category_id = "missing".into();
        let err = fx
            .product_service
            .update(&product.id, reassigned)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Integrity { .. }));
        // Local record untouched.
        assert_eq!(
            fx.products.get(&product.id).await.unwrap().unwrap().category_id,
            category.id
        );
    }

    #[tokio::test]
    async fn validation_failures_abort_before_side_effects() {
        let fx = fixture();
        let mut observer = fx
            .bus
            .bind_queue(CATEGORY_EXCHANGE, "observer")
            .await
            .unwrap();

        let err = fx
            .category_service
            .create(Category::new("  ", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert!(fx.categories.is_empty().await);
        assert!(observer.try_recv().is_err());
    }
}
