use std::fmt::Display;

use jiff::{
    civil::{Date, DateTime, Time},
    tz::TimeZone,
    Timestamp,
};

use crate::error::EtlError;

/// Field values that are read as a missing cell.
pub const NA_VALUES: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    DateTime,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// A single cell, detached from its column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.strftime("%Y-%m-%d %H:%M:%S")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<DateTime>>),
}

impl ColumnData {
    /// Pick the narrowest type that holds every present cell.  A column with
    /// missing cells is never `Integer`, and a column with no rows is `Text`.
    pub fn infer(cells: Vec<Option<String>>) -> ColumnData {
        if cells.is_empty() {
            return ColumnData::Text(cells);
        }
        let any_missing = cells.iter().any(Option::is_none);
        if !any_missing && cells.iter().flatten().all(|s| parse_int(s).is_some()) {
            return ColumnData::Integer(
                cells.iter().map(|c| c.as_deref().and_then(parse_int)).collect(),
            );
        }
        if cells.iter().flatten().all(|s| parse_float(s).is_some()) {
            return ColumnData::Float(
                cells.iter().map(|c| c.as_deref().and_then(parse_float)).collect(),
            );
        }
        if cells.iter().flatten().all(|s| parse_datetime(s).is_some()) {
            return ColumnData::DateTime(
                cells.iter().map(|c| c.as_deref().and_then(parse_datetime)).collect(),
            );
        }
        ColumnData::Text(cells)
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Text(_) => ColumnType::Text,
            ColumnData::DateTime(_) => ColumnType::DateTime,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Float(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::DateTime(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    pub fn value(&self, i: usize) -> Value {
        let value = match self {
            ColumnData::Integer(v) => v.get(i).copied().flatten().map(Value::Integer),
            ColumnData::Float(v) => v.get(i).copied().flatten().map(Value::Float),
            ColumnData::Text(v) => v.get(i).cloned().flatten().map(Value::Text),
            ColumnData::DateTime(v) => v.get(i).copied().flatten().map(Value::DateTime),
        };
        value.unwrap_or(Value::Null)
    }

    /// Text rendering of a present cell, as it would have appeared in the csv.
    pub fn render(&self, i: usize) -> Option<String> {
        match self.value(i) {
            Value::Null => None,
            Value::Text(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Keep the rows where `keep` is true.
    pub fn retain(&mut self, keep: &[bool]) {
        fn retain_vec<T>(v: &mut Vec<T>, keep: &[bool]) {
            let mut flags = keep.iter();
            v.retain(|_| flags.next().copied().unwrap_or(true));
        }
        match self {
            ColumnData::Integer(v) => retain_vec(v, keep),
            ColumnData::Float(v) => retain_vec(v, keep),
            ColumnData::Text(v) => retain_vec(v, keep),
            ColumnData::DateTime(v) => retain_vec(v, keep),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: &str, data: ColumnData) -> Column {
        Column {
            name: name.to_string(),
            data,
        }
    }
}

/// An ordered set of equal length, named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Dataset, EtlError> {
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            for column in &columns {
                if column.data.len() != expected {
                    return Err(EtlError::ColumnLength {
                        column: column.name.clone(),
                        expected,
                        found: column.data.len(),
                    });
                }
            }
        }
        Ok(Dataset { columns })
    }

    /// Parse csv text with a header line.  Short records are padded with
    /// missing cells, long records are an error.
    pub fn from_csv(text: &str) -> Result<Dataset, EtlError> {
        if text.trim().is_empty() {
            return Err(EtlError::EmptyData);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = normalize_headers(rdr.headers()?.iter());
        if headers.is_empty() {
            return Err(EtlError::EmptyData);
        }

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(EtlError::Malformed {
                    line: record.position().map(|p| p.line()).unwrap_or_default(),
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(record.get(i).and_then(present));
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| Column {
                name,
                data: ColumnData::infer(cells),
            })
            .collect();
        Dataset::new(columns)
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row(&self, i: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.data.value(i)).collect()
    }

    /// Keep the rows where `keep` is true, preserving their order.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in self.columns.iter_mut() {
            column.data.retain(keep);
        }
    }
}

fn present(field: &str) -> Option<String> {
    if field.is_empty() || NA_VALUES.contains(&field) {
        None
    } else {
        Some(field.to_string())
    }
}

/// Empty names become `Unnamed: {i}`, repeated names get a `.1`, `.2`, ... suffix.
fn normalize_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (i, name) in names.enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut k = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", base, k);
            k += 1;
        }
        out.push(candidate);
    }
    out
}

fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Parse a date or a date-time.  Timestamps with an offset are converted to UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<Timestamp>() {
        return Some(ts.to_zoned(TimeZone::UTC).datetime());
    }
    if s.contains(':') {
        if let Ok(dt) = s.parse::<DateTime>() {
            return Some(dt);
        }
        return DATETIME_FORMATS
            .iter()
            .find_map(|fmt| DateTime::strptime(fmt, s).ok());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| Date::strptime(fmt, s).ok())
        .map(|date| date.to_datetime(Time::midnight()))
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use std::error::Error;

    use super::*;

    #[test]
    fn infer_types() -> Result<(), Box<dyn Error>> {
        let csv = "id,price,name,day,empty\n1,1.5,a,2024-01-02,\n2,,b,2024-01-03,\n";
        let data = Dataset::from_csv(csv)?;
        let types: Vec<ColumnType> = data.columns().iter().map(|c| c.data.column_type()).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Text,
                ColumnType::DateTime,
                ColumnType::Float
            ]
        );
        assert_eq!(data.height(), 2);
        assert_eq!(data.row(1)[1], Value::Null);
        Ok(())
    }

    #[test]
    fn integer_column_with_missing_is_float() -> Result<(), Box<dyn Error>> {
        let data = Dataset::from_csv("x\n1\nNA\n3\n")?;
        assert_eq!(
            data.column("x").unwrap().data,
            ColumnData::Float(vec![Some(1.0), None, Some(3.0)])
        );
        Ok(())
    }

    #[test]
    fn missing_markers() -> Result<(), Box<dyn Error>> {
        let data = Dataset::from_csv("name\nN/A\nnull\nNone\nfoo\n")?;
        assert_eq!(data.column("name").unwrap().data.null_count(), 3);
        Ok(())
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(matches!(Dataset::from_csv(""), Err(EtlError::EmptyData)));
        assert!(matches!(Dataset::from_csv(" \n\n"), Err(EtlError::EmptyData)));
    }

    #[test]
    fn header_only() -> Result<(), Box<dyn Error>> {
        let data = Dataset::from_csv("a,b\n")?;
        assert_eq!(data.width(), 2);
        assert_eq!(data.height(), 0);
        assert_eq!(data.columns()[0].data.column_type(), ColumnType::Text);
        Ok(())
    }

    #[test]
    fn ragged_rows() -> Result<(), Box<dyn Error>> {
        let data = Dataset::from_csv("a,b,c\n1,2\n3,4,5\n")?;
        assert_eq!(data.row(0), vec![Value::Integer(1), Value::Integer(2), Value::Null]);
        let err = Dataset::from_csv("a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(matches!(err, EtlError::Malformed { line: 3, expected: 2, found: 3 }));
        Ok(())
    }

    #[test]
    fn header_names() -> Result<(), Box<dyn Error>> {
        let data = Dataset::from_csv("a,,a,a\n1,2,3,4\n")?;
        assert_eq!(data.column_names(), vec!["a", "Unnamed: 1", "a.1", "a.2"]);
        Ok(())
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let res = Dataset::new(vec![
            Column::new("a", ColumnData::Integer(vec![Some(1)])),
            Column::new("b", ColumnData::Integer(vec![])),
        ]);
        assert!(matches!(res, Err(EtlError::ColumnLength { .. })));
    }

    #[test]
    fn retain_rows_test() -> Result<(), Box<dyn Error>> {
        let mut data = Dataset::from_csv("a,b\n1,x\n2,y\n3,z\n")?;
        data.retain_rows(&[true, false, true]);
        assert_eq!(data.height(), 2);
        assert_eq!(data.row(1), vec![Value::Integer(3), Value::Text("z".into())]);
        Ok(())
    }

    #[test]
    fn parse_datetime_test() {
        let midnight = date(2020, 1, 31).at(0, 0, 0, 0);
        assert_eq!(parse_datetime("2020-01-31"), Some(midnight));
        assert_eq!(parse_datetime("2020/01/31"), Some(midnight));
        assert_eq!(parse_datetime("01/31/2020"), Some(midnight));
        assert_eq!(
            parse_datetime("2020-01-31 13:45:00"),
            Some(date(2020, 1, 31).at(13, 45, 0, 0))
        );
        assert_eq!(
            parse_datetime("2020-01-31T13:45:00-05:00"),
            Some(date(2020, 1, 31).at(18, 45, 0, 0))
        );
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime("2020-02-30"), None);
    }
}
