use std::env;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use crate::error::EtlError;
use crate::schedule::parse_time_of_day;

pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/datasets/who-mortality-database/main/data/mortality_data.csv";
pub const DEFAULT_DUCKDB_PATH: &str = "health_data.duckdb";
pub const DEFAULT_TABLE_NAME: &str = "processed_health_stats";
pub const DEFAULT_SCHEDULE_TIME: &str = "06:40";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Everything the daily job needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct EtlConfig {
    pub source_url: String,
    pub connection_string: String,
    pub table_name: String,
    /// `HH:MM` or `HH:MM:SS`
    pub schedule_time: String,
    /// IANA name, e.g. `America/New_York`.  System timezone if not set.
    pub timezone: Option<String>,
    pub http_timeout: Duration,
}

impl EtlConfig {
    /// Read the `ETL_*` environment variables, falling back to the defaults.
    pub fn from_env() -> Result<EtlConfig, EtlError> {
        EtlConfig::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<EtlConfig, EtlError> {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let http_timeout = match lookup("ETL_HTTP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| {
                EtlError::Config(format!("ETL_HTTP_TIMEOUT_SECS is not a number: {:?}", v))
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let config = EtlConfig {
            source_url: get("ETL_SOURCE_URL", DEFAULT_SOURCE_URL),
            connection_string: get("ETL_DUCKDB_PATH", DEFAULT_DUCKDB_PATH),
            table_name: get("ETL_TABLE_NAME", DEFAULT_TABLE_NAME),
            schedule_time: get("ETL_SCHEDULE_TIME", DEFAULT_SCHEDULE_TIME),
            timezone: lookup("ETL_TIMEZONE").filter(|v| !v.trim().is_empty()),
            http_timeout: Duration::from_secs(http_timeout),
        };
        parse_time_of_day(&config.schedule_time)?;
        Ok(config)
    }
}

/// Load `.env/{env_name}.env` into the process environment if it exists.
pub fn load_env_file(env_name: &str) {
    let path = format!(".env/{}.env", env_name);
    match dotenvy::from_path(Path::new(&path)) {
        Ok(_) => info!("Loaded environment from {}", path),
        Err(e) => warn!("Could not load {}: {}, using the process environment", path, e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::error::Error;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let config = EtlConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(config.connection_string, "health_data.duckdb");
        assert_eq!(config.table_name, "processed_health_stats");
        assert_eq!(config.schedule_time, "06:40");
        assert_eq!(config.timezone, None);
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn overrides() -> Result<(), Box<dyn Error>> {
        let config = EtlConfig::from_lookup(lookup(&[
            ("ETL_SOURCE_URL", "http://localhost/x.csv"),
            ("ETL_DUCKDB_PATH", ":memory:"),
            ("ETL_TABLE_NAME", "stats"),
            ("ETL_SCHEDULE_TIME", "23:15:30"),
            ("ETL_TIMEZONE", "America/New_York"),
            ("ETL_HTTP_TIMEOUT_SECS", "5"),
        ]))?;
        assert_eq!(config.source_url, "http://localhost/x.csv");
        assert_eq!(config.connection_string, ":memory:");
        assert_eq!(config.table_name, "stats");
        assert_eq!(config.schedule_time, "23:15:30");
        assert_eq!(config.timezone.as_deref(), Some("America/New_York"));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn invalid_values() {
        let res = EtlConfig::from_lookup(lookup(&[("ETL_SCHEDULE_TIME", "6.40")]));
        assert!(matches!(res, Err(EtlError::InvalidTime(_))));
        let res = EtlConfig::from_lookup(lookup(&[("ETL_HTTP_TIMEOUT_SECS", "soon")]));
        assert!(matches!(res, Err(EtlError::Config(_))));
    }
}
