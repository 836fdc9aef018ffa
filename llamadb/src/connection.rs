//! Single database connections

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::builder::QueryBuilder;
use crate::config::ConnectionParams;
use crate::cursor::Cursor;
use crate::dialect::SqlDialect;
use crate::driver::{Driver, DriverConnection, QueryOutput};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::traits::IntoParams;
use crate::value::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One open database handle.
///
/// Unless `autocommit` is set in the connection parameters, the first
/// statement after open, `commit` or `rollback` implicitly starts a
/// transaction; nothing is persisted until [`commit`](Self::commit).
///
/// ```no_run
/// use llamadb::{Connection, ConnectionParams};
///
/// # async fn demo() -> llamadb::Result<()> {
/// let mut conn = Connection::open(ConnectionParams::sqlite("app.db")).await?;
/// conn.execute("INSERT INTO users (name, age) VALUES (?, ?)", ("ada", 36)).await?;
/// conn.commit().await?;
///
/// let mut cursor = conn.execute("SELECT name FROM users WHERE age > ?", 30).await?;
/// for row in cursor.fetch_all()? {
///     println!("{}", row.get::<String>("name")?);
/// }
/// conn.close().await
/// # }
/// ```
pub struct Connection {
    id: u64,
    params: Arc<ConnectionParams>,
    dialect: SqlDialect,
    handle: Option<Box<dyn DriverConnection>>,
    alive: Arc<AtomicBool>,
    in_transaction: bool,
}

impl Connection {
    /// Open a connection with the built-in driver selected by `params.driver`.
    pub async fn open(params: ConnectionParams) -> Result<Self> {
        let driver = params.driver.driver()?;
        Self::open_shared(driver.as_ref(), Arc::new(params)).await
    }

    /// Open a connection with any driver implementation.
    pub async fn open_with(driver: &dyn Driver, params: ConnectionParams) -> Result<Self> {
        Self::open_shared(driver, Arc::new(params)).await
    }

    pub(crate) async fn open_shared(
        driver: &dyn Driver,
        params: Arc<ConnectionParams>,
    ) -> Result<Self> {
        let handle = driver.connect(&params).await?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = id, driver = driver.name(), "Connection opened");
        Ok(Self {
            id,
            params,
            dialect: driver.dialect(),
            handle: Some(handle),
            alive: Arc::new(AtomicBool::new(true)),
            in_transaction: false,
        })
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// A query builder targeting this connection's dialect.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::with_dialect(self.dialect)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none() || !self.alive.load(Ordering::Acquire)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    fn handle(&mut self) -> Result<&mut Box<dyn DriverConnection>> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        self.handle.as_mut().ok_or(Error::ConnectionClosed)
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        if !self.params.autocommit && !self.in_transaction {
            self.begin().await?;
        }
        debug!(conn_id = self.id, sql, "Executing statement");
        trace!(conn_id = self.id, params = params.len(), "Statement parameters");
        self.handle()?.execute(sql, params).await
    }

    /// Execute one statement with positional `?` parameters.
    pub async fn execute(&mut self, sql: &str, params: impl IntoParams) -> Result<Cursor> {
        let params = params.into_params();
        let output = self.run(sql, &params).await?;
        Ok(Cursor::new(output, self.alive_flag()))
    }

    /// Execute a built query.
    pub async fn execute_query(&mut self, query: &Query) -> Result<Cursor> {
        let output = self.run(query.sql(), query.params()).await?;
        Ok(Cursor::new(output, self.alive_flag()))
    }

    /// Execute `sql` once per parameter set.
    ///
    /// The returned cursor carries no rows; `rows_affected` is the total
    /// over every execution and `last_insert_id` comes from the last one.
    pub async fn execute_many<I, P>(&mut self, sql: &str, batch: I) -> Result<Cursor>
    where
        I: IntoIterator<Item = P>,
        P: IntoParams,
    {
        let mut total = QueryOutput::default();
        let mut executions = 0usize;
        for params in batch {
            let output = self.run(sql, &params.into_params()).await?;
            total.rows_affected += output.rows_affected;
            total.last_insert_id = output.last_insert_id.or(total.last_insert_id);
            executions += 1;
        }
        debug!(conn_id = self.id, executions, rows_affected = total.rows_affected, "Batch finished");
        Ok(Cursor::new(total, self.alive_flag()))
    }

    /// Start a transaction explicitly. A no-op when one is already active.
    pub async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Ok(());
        }
        self.handle()?.begin().await?;
        self.in_transaction = true;
        trace!(conn_id = self.id, "Transaction started");
        Ok(())
    }

    /// Commit the active transaction. A no-op when none is active.
    pub async fn commit(&mut self) -> Result<()> {
        self.handle()?;
        if !self.in_transaction {
            return Ok(());
        }
        self.handle()?.commit().await?;
        self.in_transaction = false;
        trace!(conn_id = self.id, "Transaction committed");
        Ok(())
    }

    /// Discard the active transaction. A no-op when none is active.
    pub async fn rollback(&mut self) -> Result<()> {
        self.handle()?;
        if !self.in_transaction {
            return Ok(());
        }
        let result = self.handle()?.rollback().await;
        self.in_transaction = false;
        trace!(conn_id = self.id, ok = result.is_ok(), "Transaction rolled back");
        result
    }

    /// Check that the connection is still usable.
    pub async fn ping(&mut self) -> Result<()> {
        self.handle()?.ping().await
    }

    /// Close the handle. Cursors produced by this connection become
    /// unusable. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::Release);
        self.in_transaction = false;
        match self.handle.take() {
            Some(handle) => {
                debug!(conn_id = self.id, "Connection closed");
                handle.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
