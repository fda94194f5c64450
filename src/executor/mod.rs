//! Query Executor Contract
//!
//! The SQL engine is an external collaborator. The protocol core only needs two
//! steps from it:
//!
//! 1. [`QueryExecutor::prepare`] parses and plans the statement. Errors here
//!    (syntax, unknown tables, type errors) are reported to the client inline
//!    with the submission response.
//! 2. [`PreparedStatement::execute`] runs the plan to completion on a runner
//!    task, observing a [`CancellationToken`] at its await points.
//!
//! [`DataFusionExecutor`] is the engine shipped with the server.

mod engine;

pub use engine::DataFusionExecutor;

use std::sync::OnceLock;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Position of a syntax error inside the statement text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
    pub line_number: u32,
    pub column_number: u32,
}

/// Error reported by the SQL engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Statement could not be parsed or planned
    #[error("{message}")]
    Planning {
        message: String,
        location: Option<ErrorLocation>,
    },

    /// Statement failed while running
    #[error("{message}")]
    Execution { message: String },

    /// Execution observed a cancellation request
    #[error("Query was cancelled")]
    Cancelled,

    /// Engine misbehaved (panic, broken invariant)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ExecutorError {
    /// Planning error; the location is recovered from the message if present.
    pub fn planning(message: impl Into<String>) -> Self {
        let message = message.into();
        let location = parse_error_location(&message);
        ExecutorError::Planning { message, location }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        ExecutorError::Execution {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExecutorError::Internal {
            message: message.into(),
        }
    }

    pub fn location(&self) -> Option<ErrorLocation> {
        match self {
            ExecutorError::Planning { location, .. } => *location,
            _ => None,
        }
    }

    /// Stable error name reported to clients.
    pub fn error_name(&self) -> &'static str {
        match self {
            ExecutorError::Planning { .. } => "SYNTAX_ERROR",
            ExecutorError::Execution { .. } => "EXECUTION_ERROR",
            ExecutorError::Cancelled => "USER_CANCELED",
            ExecutorError::Internal { .. } => "GENERIC_INTERNAL_ERROR",
        }
    }

    /// Whether the fault lies with the submitted statement rather than the server.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ExecutorError::Internal { .. })
    }
}

/// Extract `Line: L, Column: C` from an engine error message.
pub fn parse_error_location(message: &str) -> Option<ErrorLocation> {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    let re = LOCATION.get_or_init(|| {
        Regex::new(r"Line: (\d+), Column: (\d+)").expect("location pattern is valid")
    });
    let caps = re.captures(message)?;
    Some(ErrorLocation {
        line_number: caps[1].parse().ok()?,
        column_number: caps[2].parse().ok()?,
    })
}

/// Output of a successful execution: the declared schema plus all batches.
///
/// The schema is kept separately so empty results still describe their columns.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl QueryOutput {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// SQL engine entry point.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Parse and plan `sql`. Must not run the query itself.
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, ExecutorError>;
}

/// A planned statement waiting to be run by the query runner.
#[async_trait]
pub trait PreparedStatement: Send {
    /// Run to completion. Implementations should return
    /// [`ExecutorError::Cancelled`] promptly once `cancel` fires.
    async fn execute(self: Box<Self>, cancel: CancellationToken)
        -> Result<QueryOutput, ExecutorError>;
}
