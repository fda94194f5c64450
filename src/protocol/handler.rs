//! Handler for querylane
//!
//! Statement protocol logic shared by the REST layer: submit, poll, cancel.
//! Owns the query registry, the runner and the paginator, and keeps
//! lock-free counters (`AtomicU64`) for the info endpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

use super::error::{ServerError, ServerResult};
use super::wire::Page;
use crate::executor::{DataFusionExecutor, QueryExecutor};
use crate::query::{
    Paginator, QueryError, QueryId, QueryRegistry, QueryRunner, QueryStatus, RegistryStats,
    Removed,
};
use crate::Config;

/// Outcome of a statement submission.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Registered and running; poll with this id
    Accepted(QueryId),
    /// Rejected while planning; never registered
    Rejected(QueryError),
}

/// What a poll observed.
#[derive(Debug, Clone)]
pub struct StatementView {
    pub id: QueryId,
    pub state: ViewState,
}

#[derive(Debug, Clone)]
pub enum ViewState {
    /// `QUEUED` or `RUNNING`
    Pending(QueryStatus),
    /// A page of a finished result
    Page(Page),
    Failed(QueryError),
}

/// Snapshot for the info endpoint.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub queries: RegistryStats,
}

pub struct Handler {
    registry: Arc<QueryRegistry>,
    runner: QueryRunner,
    paginator: Paginator,
    executor: Arc<dyn QueryExecutor>,
    result_retention: Duration,
    start_time: Instant,
    submitted_count: AtomicU64,
    rejected_count: AtomicU64,
    shutting_down: AtomicBool,
}

impl Handler {
    /// Create a handler running statements on `executor`.
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &Config) -> Self {
        let registry = Arc::new(QueryRegistry::new(config.query.registry_config()));
        let runner = QueryRunner::new(Arc::clone(&registry), config.query.query_timeout());
        let paginator = Paginator::new(config.pagination.max_rows, config.pagination.max_bytes);
        Self {
            registry,
            runner,
            paginator,
            executor,
            result_retention: config.query.result_retention(),
            start_time: Instant::now(),
            submitted_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Create a handler backed by a fresh DataFusion session.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(DataFusionExecutor::new()), config)
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Plan `sql` and, if it plans, start it in the background.
    ///
    /// Planning errors are a normal outcome ([`Submission::Rejected`]), not a
    /// server error. Never waits for execution.
    pub async fn submit(&self, sql: &str) -> ServerResult<Submission> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(ServerError::ShuttingDown);
        }
        self.submitted_count.fetch_add(1, Ordering::Relaxed);

        let statement = match self.executor.prepare(sql).await {
            Ok(statement) => statement,
            Err(e) => {
                self.rejected_count.fetch_add(1, Ordering::Relaxed);
                info!(error = %e, "statement_rejected");
                return Ok(Submission::Rejected(e.into()));
            }
        };

        let id = self.registry.create(sql)?;
        self.runner.start(id, statement)?;
        Ok(Submission::Accepted(id))
    }

    /// Current view of `id`, or the page addressed by `token`.
    ///
    /// Cancelled and unknown queries are indistinguishable: both are
    /// `QueryNotFound`.
    pub fn poll(&self, id: &str, token: Option<&str>) -> ServerResult<StatementView> {
        let id = parse_query_id(id)?;
        let state = self.registry.get(id)?;

        let view = match state.status {
            QueryStatus::Queued | QueryStatus::Running if token.is_some() => {
                return Err(ServerError::TokenExpired);
            }
            QueryStatus::Queued | QueryStatus::Running => ViewState::Pending(state.status),
            QueryStatus::Finished => {
                let page = match token {
                    None => self.paginator.first_page(&state)?,
                    Some(token) => self.paginator.next_page(&state, token)?,
                };
                ViewState::Page(page)
            }
            QueryStatus::Failed => match state.error {
                Some(error) => ViewState::Failed(error),
                None => {
                    return Err(ServerError::InternalError {
                        message: format!("Query {id} failed without an error"),
                    })
                }
            },
            QueryStatus::Cancelled => return Err(ServerError::not_found(id)),
        };

        debug!(query_id = %id, status = %state.status, "statement_polled");
        Ok(StatementView { id, state: view })
    }

    /// Cancel `id` if still in flight and forget it.
    pub async fn cancel(&self, id: &str) -> ServerResult<Removed> {
        let id = parse_query_id(id)?;
        Ok(self.registry.remove(id).await?)
    }

    /// Evict finished queries older than the configured retention.
    pub fn reap_finished(&self) -> usize {
        self.registry.reap_finished(self.result_retention)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.uptime_seconds(),
            submitted: self.submitted_count.load(Ordering::Relaxed),
            rejected: self.rejected_count.load(Ordering::Relaxed),
            queries: self.registry.stats(),
        }
    }

    /// Refuse new statements and cancel everything in flight.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let cancelled = self.registry.shutdown().await;
        info!(cancelled, "handler_shutdown");
    }
}

/// Malformed ids can never name a query, so they are simply not found.
fn parse_query_id(id: &str) -> ServerResult<QueryId> {
    Uuid::parse_str(id).map_err(|_| ServerError::not_found(id))
}
