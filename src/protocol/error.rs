//! Error types at the protocol boundary.
//!
//! Statement failures are not server errors: they travel inside a `FAILED`
//! state and are rendered as a 200 response with an `error` object. The
//! variants here are failures of the protocol request itself.

use crate::query::{PageError, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// Unknown, cancelled or evicted query id, or an unparseable one
    #[error("Query not found: {id}")]
    QueryNotFound { id: String },

    /// Continuation token does not address a page of this query
    #[error("Continuation token is invalid or expired")]
    TokenExpired,

    /// Too many statements in flight
    #[error("Server overloaded: {max_queries} queries in flight")]
    ServerOverloaded { max_queries: usize },

    /// Server is shutting down
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Internal server error
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ServerError {
    pub fn not_found(id: impl ToString) -> Self {
        ServerError::QueryNotFound { id: id.to_string() }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<RegistryError> for ServerError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => ServerError::not_found(id),
            RegistryError::CapacityExceeded(max_queries) => {
                ServerError::ServerOverloaded { max_queries }
            }
            RegistryError::InvalidTransition { .. } => ServerError::InternalError {
                message: e.to_string(),
            },
        }
    }
}

impl From<PageError> for ServerError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::NotFound(id) => ServerError::not_found(id),
            PageError::Expired => ServerError::TokenExpired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryId, QueryStatus};
    use uuid::Uuid;

    #[test]
    fn test_registry_error_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServerError::from(RegistryError::NotFound(id)),
            ServerError::QueryNotFound { id: id.to_string() }
        );
        assert_eq!(
            ServerError::from(RegistryError::CapacityExceeded(4)),
            ServerError::ServerOverloaded { max_queries: 4 }
        );
        assert!(matches!(
            ServerError::from(RegistryError::InvalidTransition {
                id,
                from: QueryStatus::Finished,
                to: QueryStatus::Cancelled,
            }),
            ServerError::InternalError { .. }
        ));
    }

    #[test]
    fn test_page_error_mapping() {
        assert_eq!(ServerError::from(PageError::Expired), ServerError::TokenExpired);
        let id = Uuid::new_v4();
        assert_eq!(
            ServerError::from(PageError::NotFound(id)).to_string(),
            format!("Query not found: {id}")
        );
    }
}
