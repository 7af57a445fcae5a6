//! Multi-node product catalog replication core.
//!
//! Every node in the fleet keeps a full local copy of the catalog
//! (categories and products). Reads are always local; a write executes
//! on whichever node receives it and is broadcast to every peer as a
//! change event. Peers apply events idempotently, so the fleet converges
//! without any cross-node coordination on the write path.
//!
//! # Architecture
//!
//! ```text
//!             origin node                          peer node
//!  caller ──> CategoryService/ProductService
//!               │  validate + integrity check
//!               │  write authoritative store
//!               └─ publish ──> EventBus ──> exclusive queue ──> consumer
//!                              (fan-out,                          │ idempotent
//!                               skips origin)                     ▼ apply
//!                                                          local store
//! ```
//!
//! - [`service`]: origin-side write path. Local write first, then
//!   broadcast; a failed broadcast rolls the write back so no state
//!   survives without its event.
//! - [`integrity`]: referential checks (product -> category) enforced
//!   only at the origin, against authoritative state.
//! - [`bus`]: broadcast publish/subscribe capability with per-node
//!   exclusive queues and dead-letter exchanges.
//! - [`consumer`]: per-entity-kind apply loops. Tolerant of duplicate
//!   and reordered deliveries; bounded retry, then dead-letter.
//! - [`router`]: read routing between the authoritative handle and a
//!   lag-tolerant follower handle.
//! - [`node`]: assembles the above into a running [`CatalogNode`].
//!
//! # Consistency model
//!
//! Eventual consistency with at-least-once delivery. Replica apply is
//! last-delivered-wins per entity; there are no tombstones and no vector
//! clocks. Referential integrity holds on the origin at write time and
//! is deliberately not re-checked on replicas.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_mesh::bus::InMemoryBus;
//! use catalog_mesh::config::NodeConfig;
//! use catalog_mesh::model::{Category, Product};
//! use catalog_mesh::node::CatalogNode;
//! use catalog_mesh::router::StoreHandles;
//! use catalog_mesh::store::InMemoryStore;
//!
//! # async fn run() -> catalog_mesh::Result<()> {
//! let bus = Arc::new(InMemoryBus::new());
//! let node = CatalogNode::start(
//!     NodeConfig { node_id: "store-eu-1".into(), ..Default::default() },
//!     StoreHandles::single(Arc::new(InMemoryStore::<Category>::new())),
//!     StoreHandles::single(Arc::new(InMemoryStore::<Product>::new())),
//!     bus,
//! )
//! .await?;
//!
//! let category = node.categories().create(Category::new("Laptops", None)).await?;
//! println!("created {}", category.id);
//! node.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod integrity;
pub mod metrics;
pub mod model;
pub mod node;
pub mod router;
pub mod service;
pub mod store;

pub use bus::{EventBus, InMemoryBus};
pub use config::NodeConfig;
pub use error::{CatalogError, Result};
pub use event::{CategoryEvent, ProductEvent, CATEGORY_EXCHANGE, PRODUCT_EXCHANGE};
pub use model::{Category, EntityKind, Product};
pub use node::CatalogNode;
pub use router::StoreHandles;
pub use service::{CategoryService, ProductService};
pub use store::{DocumentStore, InMemoryStore};
