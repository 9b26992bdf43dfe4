//! Return types and result shaping.
//!
//! Every query runs against a [`ReturnType`] tag that decides how the raw
//! [`ResultSet`] is turned into a [`QueryResult`]. Single-row and
//! single-value shapes fail with [`ResultError::RowMissing`] on an empty
//! result unless their nullable variant was requested.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{ArgumentError, ResultError};
use crate::value::SqlValue;

/// A row keyed by column name, in result column order.
pub type Row = IndexMap<String, SqlValue>;

/// How a result set is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// The raw result set.
    Pdo,
    /// Nothing.
    Null,
    /// Affected row count.
    Count,
    /// All rows, keyed by column.
    Arr,
    /// All rows, positional.
    ArrNum,
    /// First row, keyed by column.
    Row,
    /// First row, positional.
    RowNum,
    /// First row or nothing.
    RowOrNull,
    /// First positional row or nothing.
    RowNumOrNull,
    /// First column to second column.
    Map,
    /// First column to the whole row.
    MapArr,
    /// First column of the first row.
    Val,
    /// First column of the first row, or nothing.
    ValOrNull,
    /// First column of every row.
    Col,
}

impl ReturnType {
    /// The tag as written in queries and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdo => "pdo",
            Self::Null => "null",
            Self::Count => "count",
            Self::Arr => "arr",
            Self::ArrNum => "arr-num",
            Self::Row => "row",
            Self::RowNum => "row-num",
            Self::RowOrNull => "row?",
            Self::RowNumOrNull => "row-num?",
            Self::Map => "map",
            Self::MapArr => "map-arr",
            Self::Val => "val",
            Self::ValOrNull => "val?",
            Self::Col => "col",
        }
    }

    /// Whether the shape reads rows, and so may be served from a cache.
    #[must_use]
    pub const fn reads_rows(self) -> bool {
        !matches!(self, Self::Pdo | Self::Null | Self::Count)
    }

    const fn columns_needed(self) -> usize {
        match self {
            Self::Map => 2,
            Self::MapArr | Self::Val | Self::ValOrNull | Self::Col => 1,
            _ => 0,
        }
    }

    /// Shapes `result`.
    ///
    /// # Errors
    ///
    /// [`ResultError::RowMissing`] for `row`, `row-num` and `val` on an
    /// empty result; [`ResultError::Columns`] when rows are too narrow for
    /// the shape.
    pub fn shape(self, result: ResultSet) -> Result<QueryResult, ResultError> {
        let needed = self.columns_needed();
        if !result.rows.is_empty() && result.columns.len() < needed {
            return Err(ResultError::Columns {
                return_type: self.as_str().to_string(),
                needed,
                actual: result.columns.len(),
            });
        }
        let ResultSet {
            columns,
            rows,
            affected,
        } = result;
        let keyed = |row: Vec<SqlValue>| -> Row { columns.iter().cloned().zip(row).collect() };

        Ok(match self {
            Self::Pdo => QueryResult::Cursor(ResultSet {
                columns: columns.clone(),
                rows,
                affected,
            }),
            Self::Null => QueryResult::Nothing,
            Self::Count => QueryResult::Count(affected),
            Self::Arr => QueryResult::Rows(rows.into_iter().map(keyed).collect()),
            Self::ArrNum => QueryResult::RowsNum(rows),
            Self::Row | Self::RowOrNull => {
                let first = rows.into_iter().next().map(keyed);
                if first.is_none() && self == Self::Row {
                    return Err(ResultError::RowMissing);
                }
                QueryResult::Row(first)
            }
            Self::RowNum | Self::RowNumOrNull => {
                let first = rows.into_iter().next();
                if first.is_none() && self == Self::RowNum {
                    return Err(ResultError::RowMissing);
                }
                QueryResult::RowNum(first)
            }
            Self::Map => QueryResult::Map(
                rows.into_iter()
                    .map(|mut row| {
                        let value = row.swap_remove(1);
                        (row[0].to_key(), value)
                    })
                    .collect(),
            ),
            Self::MapArr => QueryResult::MapArr(
                rows.into_iter()
                    .map(|row| (row[0].to_key(), keyed(row)))
                    .collect(),
            ),
            Self::Val | Self::ValOrNull => {
                let first = rows.into_iter().next().and_then(|row| row.into_iter().next());
                if first.is_none() && self == Self::Val {
                    return Err(ResultError::RowMissing);
                }
                QueryResult::Value(first)
            }
            Self::Col => QueryResult::Column(
                rows.into_iter()
                    .filter_map(|row| row.into_iter().next())
                    .collect(),
            ),
        })
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnType {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pdo" => Self::Pdo,
            "null" => Self::Null,
            "count" => Self::Count,
            "arr" => Self::Arr,
            "arr-num" => Self::ArrNum,
            "row" => Self::Row,
            "row-num" => Self::RowNum,
            "row?" => Self::RowOrNull,
            "row-num?" => Self::RowNumOrNull,
            "map" => Self::Map,
            "map-arr" => Self::MapArr,
            "val" => Self::Val,
            "val?" => Self::ValOrNull,
            "col" => Self::Col,
            _ => return Err(ArgumentError::ReturnType(s.to_string())),
        })
    }
}

/// A fully read result: column names, positional rows and, for writes,
/// the affected row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Rows, each as wide as `columns`.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows affected by a write.
    pub affected: u64,
}

impl ResultSet {
    /// Creates a result set from rows.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            affected: 0,
        }
    }

    /// Creates the result of a write.
    #[must_use]
    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }
}

/// A shaped result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// `pdo`
    Cursor(ResultSet),
    /// `null`
    Nothing,
    /// `count`
    Count(u64),
    /// `arr`
    Rows(Vec<Row>),
    /// `arr-num`
    RowsNum(Vec<Vec<SqlValue>>),
    /// `row`, `row?`
    Row(Option<Row>),
    /// `row-num`, `row-num?`
    RowNum(Option<Vec<SqlValue>>),
    /// `map`
    Map(IndexMap<String, SqlValue>),
    /// `map-arr`
    MapArr(IndexMap<String, Row>),
    /// `val`, `val?`
    Value(Option<SqlValue>),
    /// `col`
    Column(Vec<SqlValue>),
}

impl QueryResult {
    /// Converts the result into JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clubs() -> ResultSet {
        ResultSet::new(
            vec![String::from("id"), String::from("name")],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text(String::from("Ajax"))],
                vec![SqlValue::Int(2), SqlValue::Text(String::from("PSV"))],
            ],
        )
    }

    #[test]
    fn tags_parse_and_print() {
        for tag in [
            "pdo", "null", "count", "arr", "arr-num", "row", "row-num", "row?", "row-num?", "map",
            "map-arr", "val", "val?", "col",
        ] {
            assert_eq!(tag.parse::<ReturnType>().unwrap().as_str(), tag);
        }
        assert!(matches!(
            "rows".parse::<ReturnType>(),
            Err(ArgumentError::ReturnType(_))
        ));
    }

    #[test]
    fn keyed_and_positional_rows() {
        let QueryResult::Rows(rows) = ReturnType::Arr.shape(clubs()).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[1]["name"], SqlValue::Text(String::from("PSV")));

        let QueryResult::RowNum(Some(row)) = ReturnType::RowNum.shape(clubs()).unwrap() else {
            panic!("expected a positional row");
        };
        assert_eq!(row[0], SqlValue::Int(1));
    }

    #[test]
    fn maps_key_on_first_column() {
        let QueryResult::Map(map) = ReturnType::Map.shape(clubs()).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(map["2"], SqlValue::Text(String::from("PSV")));

        let QueryResult::MapArr(map) = ReturnType::MapArr.shape(clubs()).unwrap() else {
            panic!("expected a map of rows");
        };
        assert_eq!(map["1"]["name"], SqlValue::Text(String::from("Ajax")));
    }

    #[test]
    fn values_and_columns() {
        assert_eq!(
            ReturnType::Val.shape(clubs()).unwrap(),
            QueryResult::Value(Some(SqlValue::Int(1)))
        );
        assert_eq!(
            ReturnType::Col.shape(clubs()).unwrap(),
            QueryResult::Column(vec![SqlValue::Int(1), SqlValue::Int(2)])
        );
    }

    #[test]
    fn empty_results() {
        let empty = ResultSet::new(vec![String::from("id")], Vec::new());
        for tag in [ReturnType::Row, ReturnType::RowNum, ReturnType::Val] {
            assert_eq!(tag.shape(empty.clone()), Err(ResultError::RowMissing));
        }
        assert_eq!(
            ReturnType::RowOrNull.shape(empty.clone()).unwrap(),
            QueryResult::Row(None)
        );
        assert_eq!(
            ReturnType::ValOrNull.shape(empty.clone()).unwrap(),
            QueryResult::Value(None)
        );
        assert_eq!(
            ReturnType::Arr.shape(empty).unwrap(),
            QueryResult::Rows(Vec::new())
        );
    }

    #[test]
    fn map_needs_two_columns() {
        let narrow = ResultSet::new(vec![String::from("id")], vec![vec![SqlValue::Int(1)]]);
        assert_eq!(
            ReturnType::Map.shape(narrow),
            Err(ResultError::Columns {
                return_type: String::from("map"),
                needed: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn writes_report_affected_rows() {
        assert_eq!(
            ReturnType::Count.shape(ResultSet::affected(3)).unwrap(),
            QueryResult::Count(3)
        );
        assert!(!ReturnType::Count.reads_rows());
        assert!(ReturnType::Col.reads_rows());
    }

    #[test]
    fn json_rendering_keeps_column_order() {
        let json = ReturnType::Row.shape(clubs()).unwrap().to_json();
        assert_eq!(json.to_string(), r#"{"id":1,"name":"Ajax"}"#);
    }
}
