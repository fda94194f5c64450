//! # querylane
//!
//! Asynchronous SQL statement protocol: a client submits a statement over
//! HTTP, gets an opaque handle back immediately, and polls until the
//! statement resolves into a paged table or an error. Statements can be
//! cancelled out of band.
//!
//! ## Request Flow
//!
//! ```text
//! POST /v1/statement
//!     ↓
//! [QueryExecutor::prepare]   → syntax / planning errors returned inline
//!     ↓
//! [QueryRegistry::create]    → QUEUED, id handed back to the client
//!     ↓
//! [QueryRunner]              → RUNNING → FINISHED | FAILED | CANCELLED
//!     ↓
//! GET /v1/status/{id}        → pending status, error, or first page
//!     ↓
//! [Paginator]                → GET /v1/status/{id}/{token} for later pages
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use querylane::{Config, DataFusionExecutor, Handler};
//!
//! let config = Config::load()?;
//! let executor = Arc::new(DataFusionExecutor::new());
//! executor.register_batch("trips", batch)?;
//!
//! let handler = Arc::new(Handler::new(executor, &config));
//! querylane::protocol::rest::start_http_server(handler, &config.http, &config.query).await?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | figment-based configuration |
//! | `executor` | SQL engine contract and the DataFusion engine |
//! | `query` | registry, runner and paginator |
//! | `value` | Arrow → SQL type and JSON value mapping |
//! | `protocol` | wire types, handler, REST router |

pub mod config;
pub mod executor;
pub mod protocol;
pub mod query;
pub mod value;

pub use config::Config;
pub use executor::{DataFusionExecutor, ExecutorError, PreparedStatement, QueryExecutor, QueryOutput};
pub use protocol::{Handler, ServerError};
pub use query::{QueryId, QueryRegistry, QueryState, QueryStatus};
pub use value::SqlType;
