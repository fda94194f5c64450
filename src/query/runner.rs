//! Query Runner
//!
//! Drives one prepared statement per tokio task and reports its outcome to
//! the registry exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::registry::{QueryRegistry, RegistryError};
use super::{QueryError, QueryId, Transition};
use crate::executor::{ExecutorError, PreparedStatement, QueryOutput};
use crate::value::record_batches_to_table;

/// Spawns execution tasks for registered queries.
#[derive(Clone)]
pub struct QueryRunner {
    registry: Arc<QueryRegistry>,
    /// Per-query execution limit (None = unlimited)
    query_timeout: Option<Duration>,
}

impl QueryRunner {
    pub fn new(registry: Arc<QueryRegistry>, query_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            query_timeout,
        }
    }

    /// Schedule execution of `statement` for the registered query `id`.
    ///
    /// Returns immediately; the task commits `FINISHED`, `FAILED` or
    /// `CANCELLED` when it is done.
    pub fn start(
        &self,
        id: QueryId,
        statement: Box<dyn PreparedStatement>,
    ) -> Result<JoinHandle<()>, RegistryError> {
        let cancel = self.registry.get(id)?.cancel_token;
        let registry = Arc::clone(&self.registry);
        let timeout = self.query_timeout;
        let span = tracing::info_span!("query", query_id = %id);

        Ok(tokio::spawn(
            run_query(registry, id, statement, cancel, timeout).instrument(span),
        ))
    }
}

enum Outcome {
    Completed(QueryOutput),
    Failed(ExecutorError),
    Cancelled,
    Panicked(String),
    TimedOut(Duration),
}

async fn run_query(
    registry: Arc<QueryRegistry>,
    id: QueryId,
    statement: Box<dyn PreparedStatement>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) {
    if cancel.is_cancelled() {
        commit(&registry, id, Transition::Cancelled);
        return;
    }
    if let Err(e) = registry.transition(id, Transition::Running) {
        // Removed or cancelled before we got scheduled.
        debug!(error = %e, "query_start_skipped");
        return;
    }
    info!("query_running");

    let transition = match execute(statement, cancel.clone(), timeout).await {
        Outcome::Completed(output) => {
            match record_batches_to_table(&output.schema, &output.batches) {
                Ok(table) => {
                    info!(rows = table.row_count(), "query_finished");
                    Transition::Finished(table)
                }
                Err(e) => Transition::Failed(QueryError::internal(e.to_string())),
            }
        }
        Outcome::Cancelled => Transition::Cancelled,
        Outcome::Failed(_) if cancel.is_cancelled() => Transition::Cancelled,
        Outcome::Failed(e) => {
            info!(error = %e, "query_failed");
            Transition::Failed(e.into())
        }
        Outcome::Panicked(message) if cancel.is_cancelled() => {
            debug!(message = %message, "query_panicked_after_cancel");
            Transition::Cancelled
        }
        Outcome::Panicked(message) => {
            warn!(message = %message, "query_executor_panicked");
            Transition::Failed(QueryError::internal(format!(
                "Query execution panicked: {message}"
            )))
        }
        Outcome::TimedOut(limit) => {
            cancel.cancel();
            Transition::Failed(QueryError::timeout(limit.as_millis() as u64))
        }
    };

    commit(&registry, id, transition);
}

/// Run the statement on its own task so a panicking executor cannot take the
/// runner down with it. The task is aborted on cancellation or timeout, even
/// when the executor never looks at its token.
async fn execute(
    statement: Box<dyn PreparedStatement>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Outcome {
    let mut task = tokio::spawn(statement.execute(cancel.clone()));
    let deadline = async move {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    let joined = tokio::select! {
        biased;
        joined = &mut task => joined,
        () = cancel.cancelled() => {
            task.abort();
            return Outcome::Cancelled;
        }
        limit = deadline => {
            task.abort();
            return Outcome::TimedOut(limit);
        }
    };

    match joined {
        Ok(Ok(output)) => Outcome::Completed(output),
        Ok(Err(ExecutorError::Cancelled)) => Outcome::Cancelled,
        Ok(Err(e)) => Outcome::Failed(e),
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Outcome::Panicked(message)
        }
        Err(_) => Outcome::Cancelled,
    }
}

/// Commit a terminal transition; losing a race is expected and only logged.
fn commit(registry: &QueryRegistry, id: QueryId, transition: Transition) {
    let target = transition.target();
    match registry.transition(id, transition) {
        Ok(()) => debug!(status = %target, "query_transition_committed"),
        Err(e) => debug!(error = %e, "query_transition_rejected"),
    }
}
