//! Admin Handlers
//!
//! Liveness and server information endpoints.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::protocol::rest::dto::{InfoDto, QueryCountsDto};
use crate::protocol::Handler;

/// Liveness no-op used by clients to check the server is up
pub async fn empty() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

/// Server version, uptime and statement counts
pub async fn info(Extension(handler): Extension<Arc<Handler>>) -> Json<InfoDto> {
    let stats = handler.stats();
    let queries = stats.queries;

    Json(InfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: stats.uptime_secs,
        submitted: stats.submitted,
        rejected: stats.rejected,
        queries: QueryCountsDto {
            queued: queries.queued,
            running: queries.running,
            finished: queries.finished,
            failed: queries.failed,
            cancelled: queries.cancelled,
            total_created: queries.total_created,
        },
    })
}
