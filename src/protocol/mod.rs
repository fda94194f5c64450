//! querylane Protocol
//!
//! Client-server communication: HTTP REST API, wire format, error handling.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                  Statement Protocol                         |
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - POST   /v1/statement            submit SQL             |
//! |    - GET    /v1/status/{id}[/{tok}]  poll / fetch pages     |
//! |    - DELETE /v1/cancel/{id}          cancel and forget      |
//! |    - GET    /v1/empty, /v1/info      liveness, statistics   |
//! +-------------------------------------------------------------+
//! |  Wire Format: camelCase JSON                                |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `wire` - Wire format types (`ColumnDescriptor`, `ResultTable`, `Page`)
//! - `error` - Protocol error types
//! - `handler` - Handler implementing submit/poll/cancel
//! - `rest` - REST API handlers and routing

pub mod error;
pub mod handler;
pub mod rest;
pub mod wire;

pub use error::{ServerError, ServerResult};

pub use wire::{ColumnDescriptor, Page, ResultTable, Row, TypeArgument, TypeSignature};

pub use handler::{Handler, ServerStats, StatementView, Submission, ViewState};

