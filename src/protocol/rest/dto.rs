//! REST API Data Transfer Objects
//!
//! Response shapes of the statement protocol. Field names are camelCase and
//! absent fields are omitted, never sent as `null`.

use serde::Serialize;

use crate::executor::ErrorLocation;
use crate::protocol::wire::{ColumnDescriptor, Row};
use crate::query::{QueryError, QueryStatus};

/// Body of every statement endpoint response.
///
/// - submitted: `id`, `nextUri`, `partialCancelUri`
/// - in progress: `id`, `nextUri`, `stats`
/// - page: `id`, `columns`, `data`, and `nextUri` when more pages remain
/// - failed: `error` (plus `id` once registered)
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_cancel_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryErrorDto>,
}

#[derive(Debug, Serialize)]
pub struct StatsDto {
    pub state: QueryStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorDto {
    pub message: String,
    pub error_name: String,
    /// `USER_ERROR` or `INTERNAL_ERROR`
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_location: Option<ErrorLocation>,
}

impl QueryErrorDto {
    pub fn new(message: impl Into<String>, error_name: impl Into<String>, user_error: bool) -> Self {
        Self {
            message: message.into(),
            error_name: error_name.into(),
            error_type: if user_error { "USER_ERROR" } else { "INTERNAL_ERROR" }.to_string(),
            error_location: None,
        }
    }
}

impl From<QueryError> for QueryErrorDto {
    fn from(error: QueryError) -> Self {
        Self {
            error_location: error.location,
            ..Self::new(error.message, error.error_name, error.user_error)
        }
    }
}

/// `/v1/info` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub version: String,
    pub uptime_secs: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub queries: QueryCountsDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCountsDto {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_created: u64,
}
