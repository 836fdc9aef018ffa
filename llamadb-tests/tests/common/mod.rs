//! Shared setup for the integration tests
//!
//! Every test gets its own SQLite file inside a temporary directory that is
//! removed when the returned [`TestDb`] is dropped.

#![allow(dead_code)]

use ctor::ctor;
use llamadb::{Connection, ConnectionParams, FromRow, Row};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub const USERS_SCHEMA: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    email TEXT,
    age INTEGER,
    created_at TEXT
)";

pub struct TestDb {
    _dir: TempDir,
    pub params: ConnectionParams,
}

/// A fresh database file with the `users` table already created.
pub async fn temp_db() -> anyhow::Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("test.db");
    let params = ConnectionParams::sqlite(path.to_string_lossy());

    let mut conn = Connection::open(params.clone()).await?;
    conn.execute(USERS_SCHEMA, ()).await?;
    conn.commit().await?;
    conn.close().await?;

    Ok(TestDb { _dir: dir, params })
}

pub async fn count_users(params: &ConnectionParams) -> anyhow::Result<i64> {
    let mut conn = Connection::open(params.clone().with_autocommit(true)).await?;
    let count = conn
        .execute("SELECT COUNT(*) FROM users", ())
        .await?
        .fetch_scalar()?;
    conn.close().await?;
    Ok(count)
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub age: Option<i64>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> llamadb::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            age: row.get("age")?,
        })
    }
}
