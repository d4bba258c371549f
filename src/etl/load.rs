use duckdb::{params_from_iter, Connection};
use itertools::Itertools;
use log::{error, info};

use crate::dataset::Dataset;
use crate::error::EtlError;
use crate::utils::lib_duckdb::{open_connection, quote_identifier, sql_type, to_duckdb_value};

/// Where the cleaned data goes.
pub trait TableSink {
    /// Replace the contents of `table_name` with `data`.  Return the number
    /// of rows written.
    fn replace_table(&self, table_name: &str, data: &Dataset) -> Result<usize, EtlError>;
}

/// A DuckDB database.  A new connection is opened for every write.
#[derive(Clone, Debug)]
pub struct DuckDbStore {
    pub connection_string: String,
}

impl DuckDbStore {
    pub fn new(connection_string: &str) -> DuckDbStore {
        DuckDbStore {
            connection_string: connection_string.to_string(),
        }
    }
}

impl TableSink for DuckDbStore {
    fn replace_table(&self, table_name: &str, data: &Dataset) -> Result<usize, EtlError> {
        let mut conn = open_connection(&self.connection_string)?;
        replace_table(&mut conn, table_name, data)
    }
}

/// Write the dataset to the sink.  A `None` input writes nothing.  Errors are
/// logged, not returned.  Return the number of rows written on success.
pub fn load_data(data: Option<&Dataset>, sink: &dyn TableSink, table_name: &str) -> Option<usize> {
    let Some(data) = data else {
        info!("No data to load.");
        return None;
    };
    match sink.replace_table(table_name, data) {
        Ok(n) => {
            info!("Successfully loaded {} rows into table: {}", n, table_name);
            Some(n)
        }
        Err(e) => {
            error!(
                "An error occurred during loading data to database table {}: {}",
                table_name, e
            );
            None
        }
    }
}

/// Drop and recreate `table_name` with one column per dataset column, then
/// insert all the rows.  Runs in a single transaction.
pub fn replace_table(
    conn: &mut Connection,
    table_name: &str,
    data: &Dataset,
) -> Result<usize, EtlError> {
    if table_name.trim().is_empty() {
        return Err(EtlError::InvalidTableName(table_name.to_string()));
    }
    if data.width() == 0 {
        return Err(EtlError::NoColumns);
    }
    let table = quote_identifier(table_name);
    let columns = data
        .columns()
        .iter()
        .map(|c| {
            format!(
                "{} {}",
                quote_identifier(&c.name),
                sql_type(c.data.column_type())
            )
        })
        .join(",\n    ");
    let sql = format!(
        r#"
DROP TABLE IF EXISTS {table};
CREATE TABLE {table} (
    {columns}
);
"#
    );

    let tx = conn.transaction()?;
    tx.execute_batch(&sql)?;
    {
        let placeholders = vec!["?"; data.width()].join(", ");
        let mut stmt = tx.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
        for i in 0..data.height() {
            stmt.execute(params_from_iter(
                data.row(i).into_iter().map(to_duckdb_value),
            ))?;
        }
    }
    tx.commit()?;
    Ok(data.height())
}

/// First `limit` rows of a table, every cell cast to text.  Returns the column
/// names and the rows.
pub fn read_table(
    conn: &Connection,
    table_name: &str,
    limit: usize,
) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), EtlError> {
    let mut stmt = conn.prepare(
        r#"
SELECT column_name
FROM information_schema.columns
WHERE table_name = ?
ORDER BY ordinal_position;
"#,
    )?;
    let names: Vec<String> = stmt
        .query_map([table_name], |row| row.get::<usize, String>(0))?
        .collect::<Result<_, _>>()?;
    if names.is_empty() {
        return Err(EtlError::InvalidTableName(table_name.to_string()));
    }

    let select = names
        .iter()
        .map(|name| format!("CAST({} AS VARCHAR)", quote_identifier(name)))
        .join(", ");
    let query = format!(
        "SELECT {} FROM {} LIMIT {};",
        select,
        quote_identifier(table_name),
        limit
    );
    let mut stmt = conn.prepare(&query)?;
    let width = names.len();
    let rows: Vec<Vec<Option<String>>> = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<usize, Option<String>>(i))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<_, _>>()?;
    Ok((names, rows))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::error::Error;

    use crate::dataset::{Column, ColumnData};

    use super::*;

    struct RecordingSink {
        calls: Cell<usize>,
    }

    impl TableSink for RecordingSink {
        fn replace_table(&self, _table_name: &str, data: &Dataset) -> Result<usize, EtlError> {
            self.calls.set(self.calls.get() + 1);
            Ok(data.height())
        }
    }

    #[test]
    fn no_data_no_write() {
        let sink = RecordingSink {
            calls: Cell::new(0),
        };
        assert_eq!(load_data(None, &sink, "t"), None);
        assert_eq!(sink.calls.get(), 0);
    }

    #[test]
    fn replace_existing_table() -> Result<(), Box<dyn Error>> {
        let mut conn = open_connection(":memory:")?;
        conn.execute_batch("CREATE TABLE people (old INTEGER); INSERT INTO people VALUES (1), (2), (3);")?;

        let data = Dataset::from_csv("name,age,score\nann,31,1.5\nbob,40,\n")?;
        let n = replace_table(&mut conn, "people", &data)?;
        assert_eq!(n, 2);

        let (names, rows) = read_table(&conn, "people", 10)?;
        assert_eq!(names, vec!["name", "age", "score"]);
        assert_eq!(
            rows,
            vec![
                vec![Some("ann".to_string()), Some("31".to_string()), Some("1.5".to_string())],
                vec![Some("bob".to_string()), Some("40".to_string()), None],
            ]
        );
        Ok(())
    }

    #[test]
    fn column_types_are_explicit() -> Result<(), Box<dyn Error>> {
        let mut conn = open_connection(":memory:")?;
        let data = Dataset::from_csv("Date,n,x,s\n2020-01-01,1,1.5,a\n")?;
        replace_table(&mut conn, "typed", &data)?;
        let mut stmt = conn.prepare(
            "SELECT data_type FROM information_schema.columns WHERE table_name = 'typed' ORDER BY ordinal_position",
        )?;
        let types: Vec<String> = stmt
            .query_map([], |row| row.get::<usize, String>(0))?
            .collect::<Result<_, _>>()?;
        assert_eq!(types, vec!["TIMESTAMP", "BIGINT", "DOUBLE", "VARCHAR"]);
        Ok(())
    }

    #[test]
    fn quoted_names() -> Result<(), Box<dyn Error>> {
        let mut conn = open_connection(":memory:")?;
        let data = Dataset::new(vec![Column::new(
            "weird \"name\"",
            ColumnData::Text(vec![Some("x".to_string())]),
        )])?;
        replace_table(&mut conn, "my table", &data)?;
        let (names, rows) = read_table(&conn, "my table", 10)?;
        assert_eq!(names, vec!["weird \"name\""]);
        assert_eq!(rows, vec![vec![Some("x".to_string())]]);
        Ok(())
    }

    #[test]
    fn bad_inputs() -> Result<(), Box<dyn Error>> {
        let mut conn = open_connection(":memory:")?;
        let data = Dataset::from_csv("a\n1\n")?;
        assert!(matches!(
            replace_table(&mut conn, " ", &data),
            Err(EtlError::InvalidTableName(_))
        ));
        let empty = Dataset::new(vec![])?;
        assert!(matches!(
            replace_table(&mut conn, "t", &empty),
            Err(EtlError::NoColumns)
        ));
        Ok(())
    }

    #[test]
    fn duckdb_store_writes_a_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.duckdb");
        let store = DuckDbStore::new(path.to_str().unwrap());
        let data = Dataset::from_csv("a,b\n1,x\n2,y\n3,z\n")?;
        assert_eq!(load_data(Some(&data), &store, "letters"), Some(3));

        let conn = open_connection(path.to_str().unwrap())?;
        let (_, rows) = read_table(&conn, "letters", 2)?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }
}
