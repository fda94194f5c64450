//! Arrow Conversion Utilities
//!
//! Maps Arrow schemas and arrays produced by the executor onto the protocol's
//! column descriptors and JSON-safe row values.

use super::{float_to_json, SqlType};
use crate::protocol::wire::{ColumnDescriptor, ResultTable, Row};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Field, Float16Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, Schema, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use serde_json::Value;

/// Error type for result conversion
#[derive(Debug, thiserror::Error)]
pub enum TypeMapError {
    /// Batch layout disagrees with the declared schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
}

/// Resolve the canonical SQL type of an Arrow type. Never fails.
pub fn sql_type_of(data_type: &DataType) -> SqlType {
    match data_type {
        DataType::Null => SqlType::Unknown,
        DataType::Boolean => SqlType::Boolean,
        DataType::Int8 | DataType::UInt8 => SqlType::TinyInt,
        DataType::Int16 | DataType::UInt16 => SqlType::SmallInt,
        DataType::Int32 | DataType::UInt32 => SqlType::Integer,
        DataType::Int64 | DataType::UInt64 => SqlType::BigInt,
        DataType::Float16 | DataType::Float32 => SqlType::Real,
        DataType::Float64 => SqlType::Double,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => SqlType::Varchar,
        DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView
        | DataType::FixedSizeBinary(_) => SqlType::Varbinary,
        DataType::Date32 | DataType::Date64 => SqlType::Date,
        DataType::Time32(_) | DataType::Time64(_) => SqlType::Time,
        DataType::Timestamp(_, None) => SqlType::Timestamp,
        DataType::Timestamp(_, Some(_)) => SqlType::TimestampWithTimeZone,
        DataType::Interval(_) | DataType::Duration(_) => SqlType::Interval,
        DataType::Decimal128(precision, scale) | DataType::Decimal256(precision, scale) => {
            SqlType::Decimal {
                precision: *precision,
                scale: *scale,
            }
        }
        DataType::Dictionary(_, value_type) => sql_type_of(value_type),
        _ => SqlType::FALLBACK,
    }
}

/// Column descriptor for an Arrow field; the name is kept verbatim.
pub fn column_descriptor(field: &Field) -> ColumnDescriptor {
    sql_type_of(field.data_type()).column(field.name().as_str())
}

/// Convert one Arrow column into JSON-safe values, one per row.
///
/// Nulls become `Value::Null` whatever the column type. Temporal, decimal and
/// nested values are rendered with Arrow's display formatter.
pub fn column_to_json(array: &dyn Array) -> Result<Vec<Value>, TypeMapError> {
    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect(),
        DataType::Int8 => primitive::<Int8Type>(array, Value::from),
        DataType::Int16 => primitive::<Int16Type>(array, Value::from),
        DataType::Int32 => primitive::<Int32Type>(array, Value::from),
        DataType::Int64 => primitive::<Int64Type>(array, Value::from),
        DataType::UInt8 => primitive::<UInt8Type>(array, Value::from),
        DataType::UInt16 => primitive::<UInt16Type>(array, Value::from),
        DataType::UInt32 => primitive::<UInt32Type>(array, Value::from),
        DataType::UInt64 => primitive::<UInt64Type>(array, Value::from),
        DataType::Float16 => primitive::<Float16Type>(array, |v| float_to_json(v.to_f64())),
        DataType::Float32 => primitive::<Float32Type>(array, |v| float_to_json(f64::from(v))),
        DataType::Float64 => primitive::<Float64Type>(array, float_to_json),
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
            .collect(),
        DataType::Dictionary(_, value_type) => {
            let unpacked = arrow::compute::cast(array, value_type)?;
            return column_to_json(unpacked.as_ref());
        }
        _ => formatted(array)?,
    };
    Ok(values)
}

fn primitive<T: ArrowPrimitiveType>(array: &dyn Array, f: impl Fn(T::Native) -> Value) -> Vec<Value> {
    array
        .as_primitive::<T>()
        .iter()
        .map(|v| v.map_or(Value::Null, &f))
        .collect()
}

fn formatted(array: &dyn Array) -> Result<Vec<Value>, TypeMapError> {
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array, &options)?;
    Ok((0..array.len())
        .map(|row| {
            if array.is_null(row) {
                Value::Null
            } else {
                Value::String(formatter.value(row).to_string())
            }
        })
        .collect())
}

/// Materialize executor output into a [`ResultTable`].
///
/// Columns come from `schema` so an empty result still reports them. Row
/// order follows batch order, then row order within each batch.
pub fn record_batches_to_table(
    schema: &Schema,
    batches: &[RecordBatch],
) -> Result<ResultTable, TypeMapError> {
    let columns: Vec<ColumnDescriptor> = schema
        .fields()
        .iter()
        .map(|field| column_descriptor(field))
        .collect();

    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let mut rows: Vec<Row> = Vec::with_capacity(total_rows);

    for (i, batch) in batches.iter().enumerate() {
        if batch.num_columns() != columns.len() {
            return Err(TypeMapError::SchemaMismatch(format!(
                "Batch {} has {} columns but schema has {}",
                i,
                batch.num_columns(),
                columns.len()
            )));
        }

        let mut converted = batch
            .columns()
            .iter()
            .map(|column| column_to_json(column.as_ref()).map(Vec::into_iter))
            .collect::<Result<Vec<_>, _>>()?;

        for _ in 0..batch.num_rows() {
            rows.push(
                converted
                    .iter_mut()
                    .map(|column| column.next().unwrap_or(Value::Null))
                    .collect(),
            );
        }
    }

    Ok(ResultTable::new(columns, rows))
}
