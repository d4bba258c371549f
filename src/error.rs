use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download failed with status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("empty data, no header line found")]
    EmptyData,

    #[error("malformed csv at line {line}: expected {expected} fields, found {found}")]
    Malformed {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("column {column:?} has {found} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("duckdb error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("invalid time of day {0:?}, expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),

    #[error("dataset has no columns")]
    NoColumns,

    #[error("configuration error: {0}")]
    Config(String),
}
