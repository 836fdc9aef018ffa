//! SQLite driver on top of `tokio-rusqlite`
//!
//! Each handle owns a background thread running a `rusqlite::Connection`;
//! statements are shipped to it with `call`, so awaiting a statement never
//! blocks the runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use tokio_rusqlite::Connection;
use tracing::debug;

use super::{Driver, DriverConnection, QueryOutput};
use crate::config::ConnectionParams;
use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::value::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Driver for SQLite files and in-memory databases.
///
/// `ConnectionParams::database` is the file path; `None` or `":memory:"`
/// opens a private in-memory database per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn DriverConnection>> {
        let conn = match params.database.as_deref() {
            None | Some(":memory:") => Connection::open_in_memory().await,
            Some(path) => Connection::open(path).await,
        }
        .map_err(sqlite_error(Error::Connection))?;

        let busy_timeout = Duration::from_millis(params.busy_timeout_ms);
        conn.call(move |c| {
            c.busy_timeout(busy_timeout)?;
            Ok(())
        })
        .await
        .map_err(sqlite_error(Error::Connection))?;

        debug!(database = ?params.database, "Opened sqlite handle");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    async fn batch(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |c| {
                c.execute_batch(sql)?;
                Ok(())
            })
            .await
            .map_err(sqlite_error(Error::Execution))
    }
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();

        self.conn
            .call(move |c| {
                let mut stmt = c.prepare(&sql)?;
                let width = stmt.column_count();

                if width > 0 {
                    let columns: Arc<[String]> =
                        stmt.column_names().iter().map(|s| s.to_string()).collect();
                    let mut rows = Vec::new();
                    let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                    while let Some(row) = cursor.next()? {
                        let mut values = Vec::with_capacity(width);
                        for i in 0..width {
                            values.push(from_sqlite_value(row.get_ref(i)?));
                        }
                        rows.push(values);
                    }
                    return Ok(QueryOutput {
                        columns,
                        rows,
                        rows_affected: 0,
                        last_insert_id: None,
                    });
                }

                let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
                drop(stmt);
                let last_insert_id = if is_insert(&sql) && affected > 0 {
                    u64::try_from(c.last_insert_rowid()).ok()
                } else {
                    None
                };
                Ok(QueryOutput {
                    columns: Arc::from(Vec::new()),
                    rows: Vec::new(),
                    rows_affected: affected as u64,
                    last_insert_id,
                })
            })
            .await
            .map_err(sqlite_error(Error::Execution))
    }

    async fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("ROLLBACK").await
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn
            .call(|c| {
                c.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(sqlite_error(Error::Connection))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(sqlite_error(Error::Connection))
    }
}

/// Map a `tokio_rusqlite` error into the given variant, keeping the
/// underlying SQLite message.
fn sqlite_error(wrap: fn(String) -> Error) -> impl Fn(tokio_rusqlite::Error) -> Error {
    move |err| match err {
        tokio_rusqlite::Error::Rusqlite(e) => wrap(e.to_string()),
        other => wrap(other.to_string()),
    }
}

/// Whether `sql` is an INSERT or REPLACE, looking past leading comments
/// and a `WITH` clause.
fn is_insert(sql: &str) -> bool {
    const STATEMENTS: [&str; 5] = ["INSERT", "REPLACE", "SELECT", "UPDATE", "DELETE"];
    let is = |word: &str, kw: &str| word.eq_ignore_ascii_case(kw);
    let mut words = top_level_words(sql).into_iter();
    let statement = match words.next() {
        Some(first) if is(first, "WITH") => {
            words.find(|w| STATEMENTS.iter().any(|kw| is(w, kw)))
        }
        first => first,
    };
    statement.is_some_and(|w| is(w, "INSERT") || is(w, "REPLACE"))
}

/// Words outside comments, quotes and parentheses, in order.
fn top_level_words(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
            }
            b'\'' | b'"' | b'`' => {
                i = sql[i + 1..]
                    .find(char::from(b))
                    .map_or(bytes.len(), |n| i + n + 2);
            }
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if depth == 0 {
                    words.push(&sql[start..i]);
                }
            }
            _ => i += 1,
        }
    }
    words
}

/// Convert a llamadb Value to a SQLite storage value.
fn to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(v) => SqliteValue::Integer(i64::from(*v)),
        Value::I64(v) => SqliteValue::Integer(*v),
        Value::U64(v) => match i64::try_from(*v) {
            Ok(i) => SqliteValue::Integer(i),
            Err(_) => SqliteValue::Text(v.to_string()),
        },
        Value::F64(v) => SqliteValue::Real(*v),
        Value::String(v) => SqliteValue::Text(v.clone()),
        Value::Bytes(v) => SqliteValue::Blob(v.clone()),
        Value::Date(v) => SqliteValue::Text(v.format(DATE_FORMAT).to_string()),
        Value::DateTime(v) => SqliteValue::Text(v.format(DATETIME_FORMAT).to_string()),
        Value::Time(v) => SqliteValue::Text(v.format(TIME_FORMAT).to_string()),
        Value::Decimal(v) => SqliteValue::Text(v.to_string()),
        Value::Json(v) => SqliteValue::Text(v.to_string()),
    }
}

/// Convert a SQLite column value back. Dates come back as text and are
/// parsed on demand by `FromValue`.
fn from_sqlite_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::I64(i),
        ValueRef::Real(f) => Value::F64(f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
