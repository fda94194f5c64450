//! Statement Handlers
//!
//! Submit, poll and cancel endpoints of the statement protocol.

use std::sync::Arc;

use axum::{extract::Path, http::HeaderMap, Extension, Json};

use super::UriBase;
use crate::protocol::rest::dto::{QueryErrorDto, StatementResponse, StatsDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::{Handler, StatementView, Submission, ViewState};

/// Submit a SQL statement (request body is the raw SQL text)
pub async fn submit_statement(
    Extension(handler): Extension<Arc<Handler>>,
    Extension(uri_base): Extension<UriBase>,
    headers: HeaderMap,
    sql: String,
) -> Result<Json<StatementResponse>, RestError> {
    let response = match handler.submit(&sql).await? {
        Submission::Accepted(id) => {
            let base = uri_base.resolve(&headers);
            StatementResponse {
                id: Some(id.to_string()),
                next_uri: Some(format!("{base}/v1/status/{id}")),
                partial_cancel_uri: Some(format!("{base}/v1/cancel/{id}")),
                ..StatementResponse::default()
            }
        }
        Submission::Rejected(error) => StatementResponse {
            error: Some(error.into()),
            ..StatementResponse::default()
        },
    };
    Ok(Json(response))
}

/// Poll a statement; returns its status or its first result page
pub async fn statement_status(
    Extension(handler): Extension<Arc<Handler>>,
    Extension(uri_base): Extension<UriBase>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatementResponse>, RestError> {
    let view = handler.poll(&id, None)?;
    Ok(Json(render(view, &uri_base.resolve(&headers))))
}

/// Fetch the result page addressed by a continuation token
pub async fn statement_page(
    Extension(handler): Extension<Arc<Handler>>,
    Extension(uri_base): Extension<UriBase>,
    headers: HeaderMap,
    Path((id, token)): Path<(String, String)>,
) -> Result<Json<StatementResponse>, RestError> {
    let view = handler.poll(&id, Some(&token))?;
    Ok(Json(render(view, &uri_base.resolve(&headers))))
}

/// Cancel a statement and forget it
pub async fn cancel_statement(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<StatementResponse>, RestError> {
    let removed = handler.cancel(&id).await?;
    Ok(Json(StatementResponse {
        id: Some(removed.id.to_string()),
        stats: Some(StatsDto {
            state: removed.final_status,
        }),
        ..StatementResponse::default()
    }))
}

fn render(view: StatementView, base: &str) -> StatementResponse {
    let id = view.id;
    let mut response = StatementResponse {
        id: Some(id.to_string()),
        ..StatementResponse::default()
    };
    match view.state {
        ViewState::Pending(state) => {
            response.next_uri = Some(format!("{base}/v1/status/{id}"));
            response.stats = Some(StatsDto { state });
        }
        ViewState::Page(page) => {
            response.next_uri = page
                .next_token
                .map(|token| format!("{base}/v1/status/{id}/{token}"));
            response.columns = Some(page.columns);
            response.data = Some(page.rows);
        }
        ViewState::Failed(error) => {
            response.error = Some(QueryErrorDto::from(error));
        }
    }
    response
}
