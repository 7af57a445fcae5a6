//! Read routing between authoritative and follower store handles.
//!
//! Every entity kind has two handles onto its local collection:
//!
//! - **authoritative**: the write-of-record copy, always current. Used
//!   wherever the caller needs the freshest state (point reads feeding
//!   integrity checks or update guards).
//! - **follower**: a possibly-lagging replica endpoint. Cheaper, used for
//!   listings that tolerate replication lag.
//!
//! The router only picks which handle answers; it is not a load balancer
//! and performs no retries across replicas.

use std::sync::Arc;

use crate::error::Result;
use crate::store::{Document, DocumentStore};

/// The two physical endpoints for one entity kind's local collection.
///
/// With a single-endpoint store (tests, standalone mode) both handles
/// may point at the same object.
#[derive(Clone)]
pub struct StoreHandles<T: Document> {
    /// Write-of-record handle; serves consistent point reads.
    pub authoritative: Arc<dyn DocumentStore<T>>,
    /// Follower-preferred handle; serves lag-tolerant listings.
    pub follower: Arc<dyn DocumentStore<T>>,
}

impl<T: Document> StoreHandles<T> {
    pub fn new(
        authoritative: Arc<dyn DocumentStore<T>>,
        follower: Arc<dyn DocumentStore<T>>,
    ) -> Self {
        Self {
            authoritative,
            follower,
        }
    }

    /// Both handles backed by the same endpoint.
    pub fn single(store: Arc<dyn DocumentStore<T>>) -> Self {
        Self {
            authoritative: Arc::clone(&store),
            follower: store,
        }
    }
}

/// Routes reads to the appropriate store handle by consistency need.
#[derive(Clone)]
pub struct ReadRouter<T: Document> {
    handles: StoreHandles<T>,
}

impl<T: Document> ReadRouter<T> {
    pub fn new(handles: StoreHandles<T>) -> Self {
        Self { handles }
    }

    /// Listing read, routed to the follower-preferred handle.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.handles.follower.list().await?)
    }

    /// Point read, routed to the authoritative handle.
    ///
    /// Absent ids are `Ok(None)`, not an error.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        Ok(self.handles.authoritative.get(id).await?)
    }
}
