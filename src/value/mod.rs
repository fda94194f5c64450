//! # Value Type System
//!
//! Canonical SQL types and wire-safe scalar values for the statement protocol.
//!
//! ## Design Decisions
//!
//! - **Total mapping**: every Arrow type resolves to exactly one [`SqlType`];
//!   types with no canonical counterpart fall back to [`SqlType::FALLBACK`]
//! - **JSON-safe values**: non-finite floats are rendered as the strings
//!   `"+Infinity"`, `"-Infinity"` and `"NaN"`, nulls always become JSON `null`
//! - **Names are opaque**: column names are carried verbatim, duplicates and
//!   empty names included
//!
//! ## Usage
//!
//! ```rust,ignore
//! use querylane::value::{float_to_json, SqlType};
//!
//! let column = SqlType::BigInt.column("Int64(1) + Int64(1)");
//! assert_eq!(column.sql_type, "bigint");
//! assert_eq!(float_to_json(f64::INFINITY), serde_json::json!("+Infinity"));
//! ```

pub mod arrow_convert;

pub use arrow_convert::{column_to_json, record_batches_to_table, TypeMapError};

use std::fmt;

use serde_json::Value;

use crate::protocol::wire::{ColumnDescriptor, TypeArgument, TypeSignature};

/// Canonical SQL type tags reported to protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Varchar,
    Varbinary,
    Date,
    Time,
    Timestamp,
    TimestampWithTimeZone,
    Interval,
    Decimal { precision: u8, scale: i8 },
    /// Type of an all-null column (e.g. `SELECT NULL`)
    Unknown,
}

impl SqlType {
    /// Tag used for native types without a canonical counterpart.
    /// Their values are rendered as display strings.
    pub const FALLBACK: SqlType = SqlType::Varchar;

    /// Base type name without parameters (`decimal` for `decimal(10,2)`).
    pub fn raw_type(&self) -> &'static str {
        match self {
            SqlType::Boolean => "boolean",
            SqlType::TinyInt => "tinyint",
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::Double => "double",
            SqlType::Varchar => "varchar",
            SqlType::Varbinary => "varbinary",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::TimestampWithTimeZone => "timestamp with time zone",
            SqlType::Interval => "interval",
            SqlType::Decimal { .. } => "decimal",
            SqlType::Unknown => "unknown",
        }
    }

    /// Type signature; only decimals carry arguments (precision, scale).
    pub fn type_signature(&self) -> TypeSignature {
        let arguments = match self {
            SqlType::Decimal { precision, scale } => vec![
                TypeArgument::long(i64::from(*precision)),
                TypeArgument::long(i64::from(*scale)),
            ],
            _ => Vec::new(),
        };
        TypeSignature {
            raw_type: self.raw_type().to_string(),
            arguments,
        }
    }

    /// Build the column descriptor for a column of this type.
    pub fn column(&self, name: impl Into<String>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            sql_type: self.to_string(),
            type_signature: self.type_signature(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            other => f.write_str(other.raw_type()),
        }
    }
}

/// Convert a float into a JSON value that every client can parse.
///
/// JSON has no literal for infinities or NaN, so they travel as strings.
pub fn float_to_json(value: f64) -> Value {
    if value.is_nan() {
        Value::String("NaN".to_string())
    } else if value == f64::INFINITY {
        Value::String("+Infinity".to_string())
    } else if value == f64::NEG_INFINITY {
        Value::String("-Infinity".to_string())
    } else {
        Value::from(value)
    }
}
