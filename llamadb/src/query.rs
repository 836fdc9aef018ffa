//! Built queries: SQL text plus positional parameters

use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::error::Result;
use crate::traits::{FromRow, FromValue, IntoParams, ToValue};
use crate::value::Value;

/// An immutable SQL statement with its bound parameters.
///
/// Produced by [`QueryBuilder::build`](crate::QueryBuilder::build), or
/// written by hand with `.bind()` chaining:
///
/// ```
/// use llamadb::{Query, Value};
///
/// let query = Query::new("SELECT * FROM users WHERE id = ?").bind(7);
/// assert_eq!(query.params(), &[Value::I64(7)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
}

impl Query {
    /// Create a new query with the given SQL and no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn from_parts(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }

    /// Bind a single value to the next placeholder.
    pub fn bind<T: ToValue>(mut self, value: T) -> Self {
        self.params.push(value.to_value());
        self
    }

    /// Bind several values at once, e.g. a tuple or an `IN` list.
    pub fn bind_all<P: IntoParams>(mut self, values: P) -> Self {
        self.params.extend(values.into_params());
        self
    }

    /// Get the SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the bound parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into SQL and parameters.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Execute the query on a connection.
    pub async fn execute(&self, conn: &mut Connection) -> Result<Cursor> {
        conn.execute(&self.sql, self.params.clone()).await
    }

    /// Fetch all rows, mapped through `FromRow`.
    pub async fn fetch_all<T: FromRow>(&self, conn: &mut Connection) -> Result<Vec<T>> {
        self.execute(conn).await?.fetch_all_as()
    }

    /// Fetch the first row, if any.
    pub async fn fetch_optional<T: FromRow>(&self, conn: &mut Connection) -> Result<Option<T>> {
        self.execute(conn).await?.fetch_one_as()
    }

    /// Fetch the first column of the first row.
    pub async fn fetch_scalar<T: FromValue>(&self, conn: &mut Connection) -> Result<T> {
        self.execute(conn).await?.fetch_scalar()
    }
}
