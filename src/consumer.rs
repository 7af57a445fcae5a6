//! Event consumers: idempotent apply of remote mutations.
//!
//! One consumer task per entity kind per node, bound to that node's
//! exclusive queue on the kind's broadcast exchange. The bus guarantees
//! at-least-once delivery and nothing about ordering across events, so
//! apply is written to converge under duplicates and reordering:
//!
//! - **Create**: skip if a record with the id already exists; a
//!   duplicate-key conflict racing past the existence check is treated
//!   as success, because the record exists by the time the conflict is
//!   reported.
//! - **Update**: unconditional upsert. An update for an id never seen
//!   locally creates the record - specified behavior, not an accident.
//!   No `last_changed` comparison is made, so a late stale update can
//!   overwrite newer state (last-delivered-wins).
//! - **Delete**: unconditional delete, no-op when absent. There is no
//!   tombstone, so a replayed Create/Update arriving after the Delete
//!   can resurrect the record.
//!
//! Applying the same event twice, in any order relative to events for
//! other ids, leaves the same final state for its id.
//!
//! # Failure handling
//!
//! A failed apply is never silently dropped. Retryable failures (store
//! unavailable) are retried with exponential backoff up to the
//! configured attempt limit; what remains - and any payload that fails
//! to parse - is republished on the exchange's dead-letter counterpart.
//!
//! The consumer is the only writer for entities arriving via the bus; it
//! performs no integrity re-validation, trusting the origin node's
//! checks so replicas converge even when a referenced category has since
//! been deleted elsewhere.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::bus::{dead_letter_exchange, Delivery, EventBus, QueueReceiver};
use crate::config::ConsumerConfig;
use crate::error::{CatalogError, Result};
use crate::event::{self, CategoryEvent, ProductEvent, CATEGORY_EXCHANGE, PRODUCT_EXCHANGE};
use crate::metrics;
use crate::model::{Category, Product};
use crate::store::{DocumentStore, StoreError};

/// Whether an apply changed local state or found it already converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Local state changed.
    Fresh,
    /// The event's effect was already present (duplicate delivery or a
    /// concurrent writer got there first).
    AlreadyConverged,
}

/// Apply one category event to the local replica, idempotently.
pub async fn apply_category_event(
    store: &dyn DocumentStore<Category>,
    event: &CategoryEvent,
) -> Result<Applied> {
    match event {
        CategoryEvent::Created {
            id,
            name,
            description,
            last_changed,
        } => {
            if store.get(id).await?.is_some() {
                return Ok(Applied::AlreadyConverged);
            }
            let category = Category {
                id: id.clone(),
                name: name.clone(),
                description: description.clone(),
                last_changed: *last_changed,
            };
            match store.insert(category).await {
                Ok(()) => Ok(Applied::Fresh),
                // Lost the race between the existence check and the
                // insert - the record is there, which is what we wanted.
                Err(StoreError::DuplicateKey { .. }) => Ok(Applied::AlreadyConverged),
                Err(e) => Err(e.into()),
            }
        }
        CategoryEvent::Updated {
            id,
            name,
            description,
            last_changed,
        } => {
            let category = Category {
                id: id.clone(),
                name: name.clone(),
                description: description.clone(),
                last_changed: *last_changed,
            };
            store.upsert(category).await?;
            Ok(Applied::Fresh)
        }
        CategoryEvent::Deleted { id } => {
            if store.delete(id).await? {
                Ok(Applied::Fresh)
            } else {
                Ok(Applied::AlreadyConverged)
            }
        }
    }
}

/// Apply one product event to the local replica, idempotently.
pub async fn apply_product_event(
    store: &dyn DocumentStore<Product>,
    event: &ProductEvent,
) -> Result<Applied> {
    match event {
        ProductEvent::Created {
            id,
            name,
            price,
            category_id,
            last_changed,
        } => {
            if store.get(id).await?.is_some() {
                return Ok(Applied::AlreadyConverged);
            }
            let product = Product {
                id: id.clone(),
                name: name.clone(),
                price: *price,
                category_id: category_id.clone(),
                last_changed: *last_changed,
            };
            match store.insert(product).await {
                Ok(()) => Ok(Applied::Fresh),
                Err(StoreError::DuplicateKey { .. }) => Ok(Applied::AlreadyConverged),
                Err(e) => Err(e.into()),
            }
        }
        ProductEvent::Updated {
            id,
            name,
            price,
            category_id,
            last_changed,
        } => {
            let product = Product {
                id: id.clone(),
                name: name.clone(),
                price: *price,
                category_id: category_id.clone(),
                last_changed: *last_changed,
            };
            store.upsert(product).await?;
            Ok(Applied::Fresh)
        }
        ProductEvent::Deleted { id } => {
            if store.delete(id).await? {
                Ok(Applied::Fresh)
            } else {
                Ok(Applied::AlreadyConverged)
            }
        }
    }
}

/// Decodes and applies events of one entity kind.
#[async_trait]
pub trait EventApplier: Send + Sync + 'static {
    /// Entity kind label for logs and metrics.
    fn kind(&self) -> &'static str;

    /// The broadcast exchange this applier consumes from.
    fn exchange(&self) -> &'static str;

    /// Decode and apply one payload. Parse failures surface as
    /// [`CatalogError::EventParse`].
    async fn apply(&self, payload: &[u8]) -> Result<Applied>;
}

/// Applier for the category replica.
pub struct CategoryApplier {
    store: Arc<dyn DocumentStore<Category>>,
}

impl CategoryApplier {
    pub fn new(store: Arc<dyn DocumentStore<Category>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventApplier for CategoryApplier {
    fn kind(&self) -> &'static str {
        "category"
    }

    fn exchange(&self) -> &'static str {
        CATEGORY_EXCHANGE
    }

    async fn apply(&self, payload: &[u8]) -> Result<Applied> {
        let event: CategoryEvent = event::decode(payload)?;
        let outcome = apply_category_event(&*self.store, &event).await?;
        debug!(
            entity_id = %event.entity_id(),
            verb = event.verb(),
            deduped = outcome == Applied::AlreadyConverged,
            "applied category event"
        );
        Ok(outcome)
    }
}

/// Applier for the product replica.
pub struct ProductApplier {
    store: Arc<dyn DocumentStore<Product>>,
}

impl ProductApplier {
    pub fn new(store: Arc<dyn DocumentStore<Product>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventApplier for ProductApplier {
    fn kind(&self) -> &'static str {
        "product"
    }

    fn exchange(&self) -> &'static str {
        PRODUCT_EXCHANGE
    }

    async fn apply(&self, payload: &[u8]) -> Result<Applied> {
        let event: ProductEvent = event::decode(payload)?;
        let outcome = apply_product_event(&*self.store, &event).await?;
        debug!(
            entity_id = %event.entity_id(),
            verb = event.verb(),
            deduped = outcome == Applied::AlreadyConverged,
            "applied product event"
        );
        Ok(outcome)
    }
}

/// Run a consumer task for one entity kind until shutdown.
///
/// Deliveries are processed one at a time per kind; events for the two
/// kinds run in independent tasks and have no ordering relationship.
pub async fn run_consumer<A: EventApplier>(
    node_id: String,
    applier: A,
    bus: Arc<dyn EventBus>,
    mut queue: QueueReceiver,
    config: ConsumerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let span = tracing::info_span!("consumer", kind = applier.kind(), node_id = %node_id);

    async move {
        info!("starting consumer");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown too.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("shutdown signal received");
                        break;
                    }
                }

                delivery = queue.recv() => {
                    match delivery {
                        Some(delivery) => {
                            handle_delivery(&applier, &*bus, &config, delivery).await;
                        }
                        None => {
                            warn!("queue closed, stopping consumer");
                            break;
                        }
                    }
                }
            }
        }

        info!("consumer stopped");
    }
    .instrument(span)
    .await
}

/// Apply one delivery with bounded retries, dead-lettering what cannot
/// be applied.
async fn handle_delivery<A: EventApplier>(
    applier: &A,
    bus: &dyn EventBus,
    config: &ConsumerConfig,
    delivery: Delivery,
) {
    let start = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        match applier.apply(&delivery.payload).await {
            Ok(outcome) => {
                match outcome {
                    Applied::Fresh => metrics::record_event_applied(applier.kind()),
                    Applied::AlreadyConverged => metrics::record_event_deduped(applier.kind()),
                }
                metrics::record_apply_duration(applier.kind(), start.elapsed());
                return;
            }
            Err(CatalogError::EventParse(msg)) => {
                warn!(origin = %delivery.origin, error = %msg, "malformed event payload");
                dead_letter(applier, bus, config, &delivery, "parse").await;
                return;
            }
            Err(e) if e.is_retryable() && attempt < config.retry.max_attempts => {
                metrics::record_apply_retry(applier.kind());
                let delay = config.retry.delay_for_attempt(attempt);
                warn!(
                    origin = %delivery.origin,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retryable apply failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                let reason = if e.is_retryable() {
                    "retries_exhausted"
                } else {
                    "apply"
                };
                warn!(
                    origin = %delivery.origin,
                    attempt,
                    error = %e,
                    reason,
                    "apply failed, dead-lettering event"
                );
                dead_letter(applier, bus, config, &delivery, reason).await;
                return;
            }
        }
    }
}

/// Republish an unprocessable payload on the dead-letter exchange.
///
/// Published with an empty origin so every bound dead-letter queue
/// receives it, including one on this node.
async fn dead_letter<A: EventApplier>(
    applier: &A,
    bus: &dyn EventBus,
    config: &ConsumerConfig,
    delivery: &Delivery,
    reason: &'static str,
) {
    metrics::record_dead_letter(applier.kind(), reason);
    if !config.dead_letter_enabled {
        return;
    }
    let exchange = dead_letter_exchange(applier.exchange());
    if let Err(e) = bus.publish(&exchange, "", delivery.payload.clone()).await {
        // Nothing further to do; the failure is already counted and logged.
        warn!(exchange = %exchange, error = %e, "failed to publish dead letter");
    }
}
