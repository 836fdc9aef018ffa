//! llamadb - pooled SQL execution with a fluent query builder
//!
//! A small database layer on top of `tokio`: open [`Connection`]s directly
//! or lease them from a bounded [`ConnectionPool`], run raw SQL or SQL
//! generated by [`QueryBuilder`], and read results through a [`Cursor`].
//!
//! # Features
//!
//! - **Query builder**: SELECT / INSERT / UPDATE / DELETE with positional
//!   parameters, validated when built
//! - **Dialects**: SQLite, MySQL and PostgreSQL quoting and placeholders
//! - **Pooling**: bounded leases, scoped connections and transactions,
//!   idle eviction and shutdown
//! - **Drivers**: SQLite (`sqlite` feature) and MySQL (`mysql` feature)
//!   built in, or any [`Driver`] implementation
//!
//! # Example
//!
//! ```no_run
//! use llamadb::{ConnectionParams, ConnectionPool, FromRow, Row};
//!
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl FromRow for User {
//!     fn from_row(row: &Row) -> llamadb::Result<Self> {
//!         Ok(Self {
//!             id: row.get("id")?,
//!             name: row.get("name")?,
//!         })
//!     }
//! }
//!
//! # async fn demo() -> llamadb::Result<()> {
//! let pool = ConnectionPool::builder(ConnectionParams::sqlite("app.db"))
//!     .max_connections(4)
//!     .build()
//!     .await?;
//!
//! let adults: Vec<User> = pool
//!     .connection(|conn| {
//!         Box::pin(async move {
//!             let query = conn
//!                 .query_builder()
//!                 .select(["id", "name"])
//!                 .from_table("users")
//!                 .where_clause("age > ?", 30)
//!                 .build()?;
//!             conn.execute_query(&query).await?.fetch_all_as()
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod pool;
pub mod query;
pub mod row;
pub mod traits;
pub mod value;

pub use crate::builder::{IntoColumns, QueryBuilder};
pub use crate::config::{ConnectionParams, PoolSettings, Settings};
pub use crate::connection::Connection;
pub use crate::cursor::Cursor;
pub use crate::dialect::SqlDialect;
pub use crate::driver::{Driver, DriverConnection, DriverKind, QueryOutput};
pub use crate::error::{Error, Result};
pub use crate::pool::{ConnectionPool, ConnectionPoolBuilder, PoolStatus, PooledConnection};
pub use crate::query::Query;
pub use crate::row::Row;
pub use crate::traits::{FromRow, FromValue, IntoParams, ToValue};
pub use crate::value::Value;
