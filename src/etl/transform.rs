use std::collections::HashSet;

use itertools::Itertools;
use jiff::civil::DateTime;
use log::{info, warn};

use crate::dataset::{parse_datetime, ColumnData, Dataset};

/// Name of the column that gets converted to a datetime, if present.
pub const DATE_COLUMN: &str = "Date";

/// Clean the dataset in place.  A `None` input is returned unchanged.
///
/// Steps, in order: fill missing numeric cells with the column mean, fill
/// missing text cells with the column mode, drop duplicate rows, then convert
/// the `Date` column to datetimes.
pub fn transform_data(data: Option<Dataset>) -> Option<Dataset> {
    let mut data = data?;
    info!("Starting data transformation...");

    fill_numeric_with_mean(&mut data);
    fill_text_with_mode(&mut data);

    let removed = drop_duplicates(&mut data);
    if removed > 0 {
        info!("  Removed {} duplicate rows.", removed);
    }

    convert_date_column(&mut data, DATE_COLUMN);

    info!("Data transformation complete.");
    Some(data)
}

/// Replace missing numeric cells with the mean of the present cells.  An
/// integer column that gets filled becomes a float column.
pub fn fill_numeric_with_mean(data: &mut Dataset) {
    for column in data.columns_mut() {
        if !column.data.column_type().is_numeric() || column.data.null_count() == 0 {
            continue;
        }
        let values: Vec<Option<f64>> = match &column.data {
            ColumnData::Integer(v) => v.iter().map(|x| x.map(|x| x as f64)).collect(),
            ColumnData::Float(v) => v.clone(),
            _ => continue,
        };
        match mean(&values) {
            Some(mean) => {
                column.data =
                    ColumnData::Float(values.iter().map(|x| Some(x.unwrap_or(mean))).collect());
                info!(
                    "  Filled missing numerical values in '{}' with mean.",
                    column.name
                );
            }
            None => warn!(
                "  Column '{}' has no numerical values, leaving it missing.",
                column.name
            ),
        }
    }
}

/// Replace missing text cells with the most frequent present value.
pub fn fill_text_with_mode(data: &mut Dataset) {
    for column in data.columns_mut() {
        let ColumnData::Text(values) = &mut column.data else {
            continue;
        };
        if values.iter().all(Option::is_some) {
            continue;
        }
        let Some(fill) = mode(values) else {
            warn!(
                "  Column '{}' has no categorical values, leaving it missing.",
                column.name
            );
            continue;
        };
        for value in values.iter_mut().filter(|x| x.is_none()) {
            *value = Some(fill.clone());
        }
        info!(
            "  Filled missing categorical values in '{}' with mode.",
            column.name
        );
    }
}

/// Drop rows that repeat an earlier row in every column, keep the first one.
/// Return the number of rows removed.
pub fn drop_duplicates(data: &mut Dataset) -> usize {
    let height = data.height();
    let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(height);
    let keep: Vec<bool> = (0..height)
        .map(|i| {
            let key: Vec<CellKey> = data
                .columns()
                .iter()
                .map(|c| CellKey::new(&c.data, i))
                .collect();
            seen.insert(key)
        })
        .collect();

    let removed = keep.iter().filter(|x| !**x).count();
    if removed > 0 {
        data.retain_rows(&keep);
    }
    removed
}

/// Convert the named column to datetimes.  Cells that don't parse become
/// missing.  Does nothing if there is no such column.
pub fn convert_date_column(data: &mut Dataset, name: &str) {
    let Some(column) = data.column_mut(name) else {
        return;
    };
    let converted: Vec<Option<DateTime>> = match &column.data {
        ColumnData::DateTime(v) => v.clone(),
        other => (0..other.len())
            .map(|i| other.render(i).and_then(|s| parse_datetime(&s)))
            .collect(),
    };
    let missing = converted.iter().filter(|x| x.is_none()).count();
    column.data = ColumnData::DateTime(converted);
    if missing > 0 {
        warn!(
            "  Warning: Some '{}' values could not be converted to datetime ({} missing).",
            name, missing
        );
    } else {
        info!("  Converted '{}' to datetime format.", name);
    }
}

pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Most frequent value.  Ties go to the smallest value.
pub fn mode(values: &[Option<String>]) -> Option<String> {
    values
        .iter()
        .flatten()
        .map(String::as_str)
        .counts()
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(value, _)| value.to_string())
}

/// Hashable view of a cell, used to find duplicate rows.
#[derive(Debug, PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Null,
    Integer(i64),
    Float(u64),
    Text(&'a str),
    DateTime(DateTime),
}

impl<'a> CellKey<'a> {
    fn new(data: &'a ColumnData, i: usize) -> CellKey<'a> {
        let key = match data {
            ColumnData::Integer(v) => v.get(i).copied().flatten().map(CellKey::Integer),
            ColumnData::Float(v) => v.get(i).copied().flatten().map(|x| {
                // -0.0 == 0.0
                let x = if x == 0.0 { 0.0 } else { x };
                CellKey::Float(x.to_bits())
            }),
            ColumnData::Text(v) => v
                .get(i)
                .and_then(|x| x.as_deref())
                .map(CellKey::Text),
            ColumnData::DateTime(v) => v.get(i).copied().flatten().map(CellKey::DateTime),
        };
        key.unwrap_or(CellKey::Null)
    }
}
