//! Query Registry
//!
//! Process-wide map from query id to [`QueryState`], owned by the protocol
//! handler and shared with runner tasks.
//!
//! ## Locking
//!
//! ```text
//! queries: RwLock<HashMap<QueryId, Arc<QueryEntry>>>   held only to look up / insert / remove
//! └── QueryEntry
//!     ├── state: Mutex<QueryState>                      held only while applying a transition
//!     └── status_tx: watch::Sender<QueryStatus>         lets `remove` await the runner's ack
//! ```
//!
//! Lock order is always map → entry. No lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

use super::{QueryId, QueryState, QueryStatus, Transition};

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of in-flight (queued or running) queries (0 = unlimited)
    pub max_queries: usize,
    /// How long `remove` waits for a runner to acknowledge cancellation
    pub cancel_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_queries: 1000,
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Query not found: {0}")]
    NotFound(QueryId),

    #[error("Invalid transition for query {id}: {from} -> {to}")]
    InvalidTransition {
        id: QueryId,
        from: QueryStatus,
        to: QueryStatus,
    },

    #[error("Maximum number of in-flight queries ({0}) exceeded")]
    CapacityExceeded(usize),
}

/// Outcome of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The query was in flight and its token has been signalled
    Requested,
    /// The query had already reached a terminal state; nothing to do
    AlreadyFinished,
}

/// Receipt of a successful `remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub id: QueryId,
    pub final_status: QueryStatus,
    /// The runner did not acknowledge in time; the registry cancelled on its behalf
    pub forced: bool,
}

/// Counts of retained queries per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_created: u64,
}

struct QueryEntry {
    state: Mutex<QueryState>,
    status_tx: watch::Sender<QueryStatus>,
}

impl QueryEntry {
    fn status(&self) -> QueryStatus {
        self.state.lock().status
    }

    fn request_cancel(&self) -> CancelOutcome {
        let state = self.state.lock();
        if state.status.is_terminal() {
            CancelOutcome::AlreadyFinished
        } else {
            state.cancel_token.cancel();
            CancelOutcome::Requested
        }
    }

    /// Wait until the status is terminal. Returns false on timeout.
    async fn wait_terminal(&self, timeout: Duration) -> bool {
        let mut rx = self.status_tx.subscribe();
        let acknowledged = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| s.is_terminal())).await,
            Ok(Ok(_))
        );
        acknowledged
    }
}

/// Thread-safe registry of submitted statements.
pub struct QueryRegistry {
    queries: RwLock<HashMap<QueryId, Arc<QueryEntry>>>,
    config: RegistryConfig,
    active: AtomicUsize,
    total_created: AtomicU64,
}

impl QueryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            queries: RwLock::new(HashMap::new()),
            config,
            active: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
        }
    }

    /// Register a new statement in `QUEUED` and return its id.
    pub fn create(&self, sql_text: &str) -> Result<QueryId, RegistryError> {
        let mut queries = self.queries.write();

        let max = self.config.max_queries;
        if max > 0 && self.active.load(Ordering::Acquire) >= max {
            return Err(RegistryError::CapacityExceeded(max));
        }

        let mut id = Uuid::new_v4();
        while queries.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let (status_tx, _) = watch::channel(QueryStatus::Queued);
        let entry = QueryEntry {
            state: Mutex::new(QueryState::new(id, sql_text)),
            status_tx,
        };
        queries.insert(id, Arc::new(entry));
        self.active.fetch_add(1, Ordering::AcqRel);
        self.total_created.fetch_add(1, Ordering::Relaxed);
        drop(queries);

        tracing::info!(query_id = %id, "query_created");
        Ok(id)
    }

    /// Snapshot of the current state.
    pub fn get(&self, id: QueryId) -> Result<QueryState, RegistryError> {
        Ok(self.entry(id)?.state.lock().clone())
    }

    pub fn contains(&self, id: QueryId) -> bool {
        self.queries.read().contains_key(&id)
    }

    /// Atomically move `id` to the transition's target status.
    pub fn transition(&self, id: QueryId, transition: Transition) -> Result<(), RegistryError> {
        let entry = self.entry(id)?;
        self.commit(id, &entry, transition)
    }

    /// Signal the query's cancellation token without removing it.
    pub fn cancel(&self, id: QueryId) -> Result<CancelOutcome, RegistryError> {
        Ok(self.entry(id)?.request_cancel())
    }

    /// Delete `id`, cancelling it first if it is still in flight.
    ///
    /// Waits up to `cancel_timeout` for the runner to commit its terminal
    /// transition; after that the registry commits `CANCELLED` itself so the
    /// runner's late transition is rejected. Of two concurrent callers only
    /// one gets `Removed`, the other `NotFound`.
    pub async fn remove(&self, id: QueryId) -> Result<Removed, RegistryError> {
        let entry = self.entry(id)?;
        let mut forced = false;

        if entry.request_cancel() == CancelOutcome::Requested
            && !entry.wait_terminal(self.config.cancel_timeout).await
        {
            forced = self.commit(id, &entry, Transition::Cancelled).is_ok();
            if forced {
                tracing::warn!(
                    query_id = %id,
                    timeout_ms = self.config.cancel_timeout.as_millis() as u64,
                    "query_cancel_not_acknowledged"
                );
            }
        }

        if self.queries.write().remove(&id).is_none() {
            return Err(RegistryError::NotFound(id));
        }

        let final_status = entry.status();
        tracing::info!(query_id = %id, status = %final_status, forced, "query_removed");
        Ok(Removed {
            id,
            final_status,
            forced,
        })
    }

    /// Evict terminal queries completed more than `retention` ago.
    ///
    /// Returns the number of queries evicted.
    pub fn reap_finished(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;

        let mut queries = self.queries.write();
        let before = queries.len();
        queries.retain(|_, entry| {
            let state = entry.state.lock();
            !(state.status.is_terminal() && state.completed_at.is_some_and(|t| t < cutoff))
        });
        let reaped = before - queries.len();
        drop(queries);

        if reaped > 0 {
            tracing::info!(reaped, "finished_queries_reaped");
        }
        reaped
    }

    /// Cancel every in-flight query and wait (bounded) for runners to settle.
    ///
    /// Returns the number of queries that were cancelled.
    pub async fn shutdown(&self) -> usize {
        let entries: Vec<Arc<QueryEntry>> = self.queries.read().values().cloned().collect();
        let pending: Vec<Arc<QueryEntry>> = entries
            .into_iter()
            .filter(|entry| entry.request_cancel() == CancelOutcome::Requested)
            .collect();

        let timeout = self.config.cancel_timeout;
        let drain = async {
            for entry in &pending {
                let mut rx = entry.status_tx.subscribe();
                let _ = rx.wait_for(|s| s.is_terminal()).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                pending = pending.len(),
                "registry_shutdown_timed_out"
            );
        }

        tracing::info!(cancelled = pending.len(), "registry_shutdown");
        pending.len()
    }

    /// Number of retained queries (any status)
    pub fn len(&self) -> usize {
        self.queries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.read().is_empty()
    }

    /// Number of queued or running queries
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RegistryStats {
        let queries = self.queries.read();
        let mut stats = RegistryStats {
            total_created: self.total_created.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for entry in queries.values() {
            match entry.status() {
                QueryStatus::Queued => stats.queued += 1,
                QueryStatus::Running => stats.running += 1,
                QueryStatus::Finished => stats.finished += 1,
                QueryStatus::Failed => stats.failed += 1,
                QueryStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    fn entry(&self, id: QueryId) -> Result<Arc<QueryEntry>, RegistryError> {
        self.queries
            .read()
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    fn commit(
        &self,
        id: QueryId,
        entry: &QueryEntry,
        transition: Transition,
    ) -> Result<(), RegistryError> {
        let target = transition.target();
        let mut state = entry.state.lock();
        state
            .apply(transition)
            .map_err(|(from, to)| RegistryError::InvalidTransition { id, from, to })?;
        // Publish while still holding the state lock so watchers never see
        // statuses out of order.
        entry.status_tx.send_replace(target);
        drop(state);

        if target.is_terminal() {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
