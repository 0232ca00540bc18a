//! Statement results.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A result row as returned by the dialects: column name to decoded value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Result of executing one statement.
///
/// `row_count` is the number of rows returned; `rows_affected` is what the store
/// reports for writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult<R = Row> {
    pub row_count: u64,
    pub rows: Vec<R>,
    pub rows_affected: u64,
}

impl<R> ExecuteResult<R> {
    /// Build a result from returned rows and the affected-row count reported by the store.
    pub fn new(rows: Vec<R>, rows_affected: u64) -> Self {
        Self {
            row_count: rows.len() as u64,
            rows,
            rows_affected,
        }
    }

    /// Create an empty result.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// First row, if the statement produced any.
    pub fn into_first(self) -> Option<R> {
        if self.row_count > 0 {
            self.rows.into_iter().next()
        } else {
            None
        }
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

impl ExecuteResult<Row> {
    /// Deserialize every row into a caller-defined type.
    pub fn into_typed<T: DeserializeOwned>(self) -> DbResult<ExecuteResult<T>> {
        let rows = self
            .rows
            .into_iter()
            .map(row_into)
            .collect::<DbResult<Vec<T>>>()?;
        Ok(ExecuteResult {
            row_count: self.row_count,
            rows,
            rows_affected: self.rows_affected,
        })
    }
}

/// Deserialize one row into a caller-defined type.
pub fn row_into<T: DeserializeOwned>(row: Row) -> DbResult<T> {
    serde_json::from_value(JsonValue::Object(row)).map_err(|e| DbError::decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_row_count_prefers_returned_rows() {
        let result = ExecuteResult::new(vec![row(json!({"id": 1})), row(json!({"id": 2}))], 0);
        assert_eq!(result.row_count, 2);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_row_count_ignores_rows_affected() {
        let result: ExecuteResult = ExecuteResult::new(Vec::new(), 3);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.rows_affected, 3);
        assert!(result.is_empty());
        assert!(result.into_first().is_none());
    }

    #[test]
    fn test_empty_result() {
        let result: ExecuteResult = ExecuteResult::empty();
        assert!(result.is_empty());
        assert!(result.into_first().is_none());
    }

    #[test]
    fn test_into_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: i64,
            name: String,
        }

        let result = ExecuteResult::new(vec![row(json!({"id": 1, "name": "ann"}))], 0);
        let typed = result.into_typed::<User>().unwrap();
        assert_eq!(
            typed.rows,
            vec![User {
                id: 1,
                name: "ann".to_string()
            }]
        );
    }

    #[test]
    fn test_into_typed_mismatch_is_decode_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct User {
            id: i64,
        }

        let result = ExecuteResult::new(vec![row(json!({"id": "not a number"}))], 0);
        assert!(matches!(
            result.into_typed::<User>(),
            Err(DbError::Decode { .. })
        ));
    }
}
