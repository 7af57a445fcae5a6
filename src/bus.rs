//! Publish/subscribe bus capability trait and in-memory implementation.
//!
//! The real message bus is an external collaborator; the core only needs
//! two capabilities from it:
//!
//! - fan-out **publish** on a per-entity-kind broadcast exchange, and
//! - a per-node, exclusively-bound **queue** on each exchange, so every
//!   node receives every event exactly once per node.
//!
//! Published events carry the origin node id; fan-out skips the origin's
//! own queue, so a node never consumes its own broadcasts. Delivery is
//! at-least-once with no cross-event ordering guarantee - the consumer
//! is written to tolerate duplicates and reordering.
//!
//! Events that exhaust consumer-side retries are republished on the
//! exchange's dead-letter counterpart (see [`dead_letter_exchange`]);
//! operators bind a queue there to inspect them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Result type for bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Errors from the message bus.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// The broker is unreachable. The write path aborts the whole
    /// operation when this happens on publish.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// A message delivered to a node's queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Exchange the message was published on.
    pub exchange: String,
    /// Node that originated the event.
    pub origin: String,
    /// Encoded event payload.
    pub payload: Vec<u8>,
}

/// Receiving half of a node's exclusive queue.
pub type QueueReceiver = mpsc::UnboundedReceiver<Delivery>;

/// The dead-letter exchange paired with a broadcast exchange.
pub fn dead_letter_exchange(exchange: &str) -> String {
    format!("{exchange}.dead-letter")
}

/// Broadcast publish/subscribe with per-node exclusive queues.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Broadcast a payload to every queue bound on `exchange`, except the
    /// queue bound by `origin` itself.
    async fn publish(&self, exchange: &str, origin: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Bind this node's exclusive queue on an exchange.
    ///
    /// Binding the same (exchange, node) pair again replaces the previous
    /// binding - queues are exclusive by construction.
    async fn bind_queue(&self, exchange: &str, node_id: &str) -> BusResult<QueueReceiver>;
}

struct Binding {
    node_id: String,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// In-memory bus for tests and standalone mode.
///
/// Fan-out is synchronous into unbounded per-queue channels, which
/// models a durable per-node queue: messages published while a consumer
/// is slow sit in its queue until read. [`fail_next`](Self::fail_next)
/// injects publish failures for exercising the write path's abort
/// behavior.
pub struct InMemoryBus {
    exchanges: RwLock<HashMap<String, Vec<Binding>>>,
    fail_next: AtomicUsize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            exchanges: RwLock::new(HashMap::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` publish calls fail with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_fault(&self) -> BusResult<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(BusError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, exchange: &str, origin: &str, payload: Vec<u8>) -> BusResult<()> {
        self.check_fault()?;

        let exchanges = self.exchanges.read().await;
        let Some(bindings) = exchanges.get(exchange) else {
            // No subscribers yet; broadcast to nobody is still a success.
            debug!(exchange, "publish on exchange with no bindings");
            return Ok(());
        };

        for binding in bindings {
            if binding.node_id == origin {
                continue;
            }
            let delivery = Delivery {
                exchange: exchange.to_string(),
                origin: origin.to_string(),
                payload: payload.clone(),
            };
            if binding.sender.send(delivery).is_err() {
                // Receiver dropped; the node went away without unbinding.
                warn!(exchange, node_id = %binding.node_id, "dropping delivery to dead queue");
            }
        }
        Ok(())
    }

    async fn bind_queue(&self, exchange: &str, node_id: &str) -> BusResult<QueueReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut exchanges = self.exchanges.write().await;
        let bindings = exchanges.entry(exchange.to_string()).or_default();
        // Exclusive queue: rebinding the same node replaces the old one.
        bindings.retain(|b| b.node_id != node_id);
        bindings.push(Binding {
            node_id: node_id.to_string(),
            sender: tx,
        });
        Ok(rx)
    }
}
