//! Node assembly: wires stores, services, and consumers together.
//!
//! A [`CatalogNode`] is one member of the mesh. Starting it validates
//! the configuration, builds the origin-side services, binds this node's
//! exclusive queues on both broadcast exchanges, and spawns one consumer
//! task per entity kind. Shutting it down signals the consumers and
//! waits for them to drain their in-flight delivery.
//!
//! Queues are bound before the consumers start, so events published
//! between startup and the first `recv` are buffered, not lost.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::EventBus;
use crate::config::NodeConfig;
use crate::consumer::{run_consumer, CategoryApplier, ProductApplier};
use crate::error::{CatalogError, Result};
use crate::event::{CATEGORY_EXCHANGE, PRODUCT_EXCHANGE};
use crate::integrity::IntegrityValidator;
use crate::model::{Category, Product};
use crate::router::StoreHandles;
use crate::service::{CategoryService, ProductService};

/// A running catalog node: origin-side services plus replication
/// consumers, sharing one pair of store handles.
pub struct CatalogNode {
    node_id: String,
    categories: CategoryService,
    products: ProductService,
    shutdown_tx: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
}

impl CatalogNode {
    /// Start a node: bind queues, spawn consumers, expose services.
    pub async fn start(
        config: NodeConfig,
        category_handles: StoreHandles<Category>,
        product_handles: StoreHandles<Product>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = config.node_id.clone();

        let validator = IntegrityValidator::new(
            Arc::clone(&category_handles.authoritative),
            Arc::clone(&product_handles.authoritative),
        );

        let categories = CategoryService::new(
            node_id.clone(),
            category_handles.clone(),
            validator.clone(),
            Arc::clone(&bus),
        );
        let products = ProductService::new(
            node_id.clone(),
            product_handles.clone(),
            validator,
            Arc::clone(&bus),
        );

        // Bind both exclusive queues before spawning anything, so no
        // broadcast published after start() returns can be missed.
        let category_queue = bus
            .bind_queue(CATEGORY_EXCHANGE, &node_id)
            .await
            .map_err(|e| CatalogError::publish(CATEGORY_EXCHANGE, e.to_string()))?;
        let product_queue = bus
            .bind_queue(PRODUCT_EXCHANGE, &node_id)
            .await
            .map_err(|e| CatalogError::publish(PRODUCT_EXCHANGE, e.to_string()))?;
        info!(
            node_id = %node_id,
            category_queue = %config.queue_name(CATEGORY_EXCHANGE),
            product_queue = %config.queue_name(PRODUCT_EXCHANGE),
            "queues bound"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Remote events apply to the authoritative handle: the follower
        // is a read preference over the same data, not a second copy.
        let consumers = vec![
            tokio::spawn(run_consumer(
                node_id.clone(),
                CategoryApplier::new(Arc::clone(&category_handles.authoritative)),
                Arc::clone(&bus),
                category_queue,
                config.consumer.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_consumer(
                node_id.clone(),
                ProductApplier::new(Arc::clone(&product_handles.authoritative)),
                Arc::clone(&bus),
                product_queue,
                config.consumer.clone(),
                shutdown_rx,
            )),
        ];

        info!(node_id = %node_id, "catalog node started");

        Ok(Self {
            node_id,
            categories,
            products,
            shutdown_tx,
            consumers,
        })
    }

    /// This node's identity.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Origin-side category operations.
    pub fn categories(&self) -> &CategoryService {
        &self.categories
    }

    /// Origin-side product operations.
    pub fn products(&self) -> &ProductService {
        &self.products
    }

    /// Signal the consumers and wait for them to stop.
    ///
    /// In-flight deliveries finish applying; queued deliveries behind
    /// them are abandoned to the (durable) queue.
    pub async fn shutdown(self) -> Result<()> {
        info!(node_id = %self.node_id, "shutting down catalog node");
        // Receivers may already be gone if a consumer stopped on its own.
        let _ = self.shutdown_tx.send(true);
        for handle in self.consumers {
            handle
                .await
                .map_err(|e| CatalogError::Internal(format!("consumer task panicked: {e}")))?;
        }
        info!(node_id = %self.node_id, "catalog node stopped");
        Ok(())
    }
}
