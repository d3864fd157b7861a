//! The pluggable persistence contract shared by every request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::session::Record;

/// Persistence back-end for session records, keyed by identifier.
///
/// One store instance is shared process-wide across all requests. The
/// coordinator sequences the operations it issues for a single identifier
/// within one request; concurrent requests that share an identifier are
/// last-write-wins by design, and a store is not expected to order
/// operations across distinct identifiers.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Fetch the record stored under `id`.
    ///
    /// `Ok(None)` and [`StoreError::NotFound`](crate::StoreError::NotFound)
    /// are both treated by the coordinator as "no record": a fresh session
    /// is generated instead. Any other error aborts the request.
    async fn load(&self, id: &str) -> StoreResult<Option<Record>>;

    /// Persist `record` under `id`, replacing any previous snapshot wholesale.
    async fn save(&self, id: &str, record: &Record) -> StoreResult<()>;

    /// Remove the record stored under `id`.
    ///
    /// Removing an absent key is not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Whether this store supports refresh-only writes.
    ///
    /// The coordinator only issues [`touch`](Self::touch) at completion when
    /// this returns true; otherwise a session due only for an expiration
    /// refresh is left alone.
    fn implements_touch(&self) -> bool {
        false
    }

    /// Refresh the stored expiration metadata without rewriting content.
    ///
    /// The default delegates to a full [`save`](Self::save).
    async fn touch(&self, id: &str, record: &Record) -> StoreResult<()> {
        self.save(id, record).await
    }

    /// Enumerate every live record.
    async fn all(&self) -> StoreResult<HashMap<String, Record>>;

    /// Number of live records.
    async fn count(&self) -> StoreResult<usize>;

    /// Remove every record.
    async fn clear(&self) -> StoreResult<()>;
}

/// Shared store-reachability flag consulted at the top of every request.
///
/// While unreachable, the coordinator attaches no session at all and
/// requests proceed without one; nothing is queued or retried. Handling
/// resumes once [`mark_reachable`](Self::mark_reachable) is called. Clones
/// share state, so the handle can be passed to whatever watches the
/// backing connection.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    reachable: Arc<AtomicBool>,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ConnectivityState {
    /// A new flag, initially reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce the store is reachable again.
    pub fn mark_reachable(&self) {
        self.reachable.store(true, Ordering::SeqCst);
    }

    /// Announce the store became unreachable.
    pub fn mark_unreachable(&self) {
        self.reachable.store(false, Ordering::SeqCst);
    }

    /// Current reachability.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
