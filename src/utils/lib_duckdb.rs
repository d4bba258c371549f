use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::Connection;
use jiff::tz::TimeZone;

use crate::dataset::{ColumnType, Value};

/// Open a DuckDB connection.  Accepts a file path, the same path prefixed
/// with `duckdb://`, or `:memory:`.
pub fn open_connection(connection_string: &str) -> Result<Connection, duckdb::Error> {
    let path = connection_string
        .strip_prefix("duckdb://")
        .unwrap_or(connection_string);
    if path.is_empty() || path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
}

/// Quote a table or column name, e.g. `my "col"` becomes `"my ""col"""`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The DuckDB column type used to store a column of this type.
pub fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE",
        ColumnType::Text => "VARCHAR",
        ColumnType::DateTime => "TIMESTAMP",
    }
}

pub fn to_duckdb_value(value: Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Integer(v) => DuckValue::BigInt(v),
        Value::Float(v) => DuckValue::Double(v),
        Value::Text(v) => DuckValue::Text(v),
        Value::DateTime(dt) => match dt.to_zoned(TimeZone::UTC) {
            Ok(zoned) => {
                DuckValue::Timestamp(TimeUnit::Microsecond, zoned.timestamp().as_microsecond())
            }
            Err(_) => DuckValue::Text(Value::DateTime(dt).to_string()),
        },
    }
}
