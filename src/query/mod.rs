//! Query Lifecycle
//!
//! Per-statement state and the components that drive it:
//!
//! ```text
//! QueryRegistry (id → QueryState)
//! ├── QueryRunner   executes prepared statements on tokio tasks
//! └── Paginator     slices finished results into signed pages
//! ```
//!
//! ## State Machine
//!
//! ```text
//! QUEUED ──► RUNNING ──► FINISHED | FAILED | CANCELLED
//!    └───────────────────────────────────────┘
//! ```
//!
//! Transitions only move forward and terminal states are final. A second
//! terminal transition (cancel racing completion) is rejected with
//! [`RegistryError::InvalidTransition`].

pub mod paginator;
pub mod registry;
pub mod runner;

pub use paginator::{PageError, Paginator};
pub use registry::{
    CancelOutcome, QueryRegistry, RegistryConfig, RegistryError, RegistryStats, Removed,
};
pub use runner::QueryRunner;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::executor::{ErrorLocation, ExecutorError};
use crate::protocol::wire::ResultTable;

/// Opaque handle identifying a submitted statement
pub type QueryId = Uuid;

/// Lifecycle status of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl QueryStatus {
    fn rank(self) -> u8 {
        match self {
            QueryStatus::Queued => 0,
            QueryStatus::Running => 1,
            QueryStatus::Finished | QueryStatus::Failed | QueryStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` respects the state machine.
    pub fn can_transition_to(self, next: QueryStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Queued => "QUEUED",
            QueryStatus::Running => "RUNNING",
            QueryStatus::Finished => "FINISHED",
            QueryStatus::Failed => "FAILED",
            QueryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error of a failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub message: String,
    pub error_name: String,
    pub user_error: bool,
    pub location: Option<ErrorLocation>,
}

impl QueryError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_name: "GENERIC_INTERNAL_ERROR".to_string(),
            user_error: false,
            location: None,
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            message: format!("Query timeout after {timeout_ms}ms"),
            error_name: "EXCEEDED_TIME_LIMIT".to_string(),
            user_error: false,
            location: None,
        }
    }
}

impl From<ExecutorError> for QueryError {
    fn from(err: ExecutorError) -> Self {
        Self {
            message: err.to_string(),
            error_name: err.error_name().to_string(),
            user_error: err.is_user_error(),
            location: err.location(),
        }
    }
}

/// Requested state change, carrying the payload of the target state.
#[derive(Debug, Clone)]
pub enum Transition {
    Running,
    Finished(ResultTable),
    Failed(QueryError),
    Cancelled,
}

impl Transition {
    pub fn target(&self) -> QueryStatus {
        match self {
            Transition::Running => QueryStatus::Running,
            Transition::Finished(_) => QueryStatus::Finished,
            Transition::Failed(_) => QueryStatus::Failed,
            Transition::Cancelled => QueryStatus::Cancelled,
        }
    }
}

/// Snapshot of one statement's lifecycle.
///
/// `result` is set only when `Finished`, `error` only when `Failed`; both are
/// written once by the registry.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub id: QueryId,
    pub status: QueryStatus,
    pub sql_text: Arc<str>,
    pub result: Option<Arc<ResultTable>>,
    pub error: Option<QueryError>,
    pub cancel_token: CancellationToken,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-query secret scoping continuation tokens
    pub(crate) page_key: [u8; 16],
}

impl QueryState {
    pub(crate) fn new(id: QueryId, sql_text: &str) -> Self {
        Self {
            id,
            status: QueryStatus::Queued,
            sql_text: Arc::from(sql_text),
            result: None,
            error: None,
            cancel_token: CancellationToken::new(),
            created_at: Utc::now(),
            completed_at: None,
            page_key: rand::random(),
        }
    }

    /// Apply `transition` in place, enforcing monotonicity.
    pub(crate) fn apply(&mut self, transition: Transition) -> Result<(), (QueryStatus, QueryStatus)> {
        let target = transition.target();
        if !self.status.can_transition_to(target) {
            return Err((self.status, target));
        }
        match transition {
            Transition::Running => {}
            Transition::Finished(table) => self.result = Some(Arc::new(table)),
            Transition::Failed(error) => self.error = Some(error),
            Transition::Cancelled => self.cancel_token.cancel(),
        }
        self.status = target;
        if target.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
