//! Result rows

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::FromValue;
use crate::value::Value;

/// One row of a result set.
///
/// Column names are shared between all rows of the same result, values are
/// stored in select-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from shared column names and its values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names, in select-list order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values, in select-list order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column name.
    ///
    /// Returns an error if the column doesn't exist.
    pub fn get_value(&self, column: &str) -> Result<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| Error::ColumnNotFound(column.to_string()))
    }

    /// Get a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        T::from_value(self.get_value(column)?.clone())
    }

    /// Get a typed value by position.
    pub fn get_at<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| Error::ColumnNotFound(format!("#{}", index)))?;
        T::from_value(value.clone())
    }

    /// Take ownership of the values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
