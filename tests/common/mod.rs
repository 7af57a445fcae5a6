//! Shared harness for multi-node integration tests.
//!
//! Builds fleets of in-process nodes wired through one in-memory bus,
//! with direct access to each node's backing stores for assertions.

use std::sync::Arc;
use std::time::Duration;

use catalog_mesh::bus::InMemoryBus;
use catalog_mesh::config::NodeConfig;
use catalog_mesh::model::{Category, Product};
use catalog_mesh::node::CatalogNode;
use catalog_mesh::router::StoreHandles;
use catalog_mesh::store::{DocumentStore, InMemoryStore};
use catalog_mesh::EventBus;

/// One fleet member plus handles onto its backing stores.
pub struct TestNode {
    pub node: CatalogNode,
    pub categories: Arc<InMemoryStore<Category>>,
    pub products: Arc<InMemoryStore<Product>>,
}

/// A fleet of nodes sharing one bus.
pub struct Fleet {
    pub bus: Arc<InMemoryBus>,
    pub nodes: Vec<TestNode>,
}

impl Fleet {
    /// Start `n` nodes named `node-0` .. `node-{n-1}` on a fresh bus.
    pub async fn start(n: usize) -> Self {
        init_tracing();
        let bus = Arc::new(InMemoryBus::new());
        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            nodes.push(start_node(&format!("node-{i}"), &bus).await);
        }
        Self { bus, nodes }
    }

    pub async fn shutdown(self) {
        for member in self.nodes {
            member.node.shutdown().await.unwrap();
        }
    }
}

pub async fn start_node(node_id: &str, bus: &Arc<InMemoryBus>) -> TestNode {
    let categories = Arc::new(InMemoryStore::new());
    let products = Arc::new(InMemoryStore::new());
    let node = CatalogNode::start(
        NodeConfig::for_testing(node_id),
        StoreHandles::single(Arc::clone(&categories) as Arc<dyn DocumentStore<Category>>),
        StoreHandles::single(Arc::clone(&products) as Arc<dyn DocumentStore<Product>>),
        Arc::clone(bus) as Arc<dyn EventBus>,
    )
    .await
    .unwrap();
    TestNode {
        node,
        categories,
        products,
    }
}

/// Poll an async condition until it holds, or panic after ~2s.
pub async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time: {what}");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}
