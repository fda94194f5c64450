//! Wire Format Types
//!
//! Column descriptors, materialized result tables and result pages as they
//! travel over the statement protocol. Cell values are `serde_json::Value`s that
//! have already been made JSON-safe by the type mapper.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single row of wire-safe values, aligned with the column list.
pub type Row = Vec<Value>;

// ============================================================================
// Column Descriptor
// ============================================================================

/// Argument of a parameterized type signature (e.g. decimal precision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeArgument {
    pub kind: String,
    pub value: i64,
}

impl TypeArgument {
    pub fn long(value: i64) -> Self {
        Self {
            kind: "LONG".to_string(),
            value,
        }
    }
}

/// Canonical `{rawType, arguments}` descriptor of a column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSignature {
    pub raw_type: String,
    pub arguments: Vec<TypeArgument>,
}

/// Column metadata reported with every result page.
///
/// Names are neither required to be unique nor non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    pub type_signature: TypeSignature,
}

// ============================================================================
// Result Table
// ============================================================================

/// Fully materialized result of a finished statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl ResultTable {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// A table with columns but no rows
    pub fn empty(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Result Page
// ============================================================================

/// One bounded chunk of a finished result.
///
/// `next_token` is `None` on the last page. An empty result is a single page
/// with no rows and no token that still carries every column.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub next_token: Option<String>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}
