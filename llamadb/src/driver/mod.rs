//! Database drivers
//!
//! A [`Driver`] opens native handles for one database family; a
//! [`DriverConnection`] runs statements on one handle. Connections, cursors
//! and the pool only ever talk to these traits, so another database can be
//! plugged in with [`ConnectionPoolBuilder::driver`](crate::ConnectionPoolBuilder::driver).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionParams;
use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::value::Value;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MySqlDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

/// Built-in database families, selected by the `driver` connection parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriverKind {
    #[default]
    #[serde(rename = "sqlite", alias = "sqlite3")]
    Sqlite,
    #[serde(rename = "mysql")]
    MySql,
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::MySql => "mysql",
        }
    }

    /// Resolve the built-in driver for this kind.
    ///
    /// Fails with [`Error::Connection`] when the driver was compiled out.
    pub fn driver(&self) -> Result<Arc<dyn Driver>> {
        match self {
            #[cfg(feature = "sqlite")]
            DriverKind::Sqlite => Ok(Arc::new(SqliteDriver)),
            #[cfg(feature = "mysql")]
            DriverKind::MySql => Ok(Arc::new(MySqlDriver)),
            #[allow(unreachable_patterns)]
            other => Err(Error::Connection(format!(
                "driver `{}` is not available: enable the `{}` feature",
                other.name(),
                other.name()
            ))),
        }
    }
}

/// Raw outcome of one statement.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Result column names; empty for statements that return no rows
    pub columns: Arc<[String]>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

/// Opens native connections for one database family.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Dialect handed to query builders created from this driver's connections.
    fn dialect(&self) -> SqlDialect;

    /// Open a new native handle.
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn DriverConnection>>;
}

/// One open native handle.
///
/// Transaction control is explicit: the connection layer decides when to
/// call `begin`, and the handle is expected to run in autocommit mode
/// otherwise.
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement with positional `?` parameters.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryOutput>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Check that the server side of the handle is still usable.
    async fn ping(&mut self) -> Result<()>;

    /// Release the native handle.
    async fn close(self: Box<Self>) -> Result<()>;
}
