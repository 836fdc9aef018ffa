//! Connection pooling
//!
//! A [`ConnectionPool`] keeps between `min_connections` and
//! `max_connections` connections. Callers lease one with
//! [`acquire`](ConnectionPool::acquire) or, preferably, through the scoped
//! helpers [`connection`](ConnectionPool::connection) and
//! [`transaction`](ConnectionPool::transaction), which give the lease back
//! on every exit path.
//!
//! ```no_run
//! use llamadb::{ConnectionParams, ConnectionPool};
//!
//! # async fn demo() -> llamadb::Result<()> {
//! let pool = ConnectionPool::builder(ConnectionParams::sqlite("app.db"))
//!     .max_connections(4)
//!     .build()
//!     .await?;
//!
//! pool.transaction(|conn| {
//!     Box::pin(async move {
//!         conn.execute("UPDATE accounts SET balance = balance - ? WHERE id = ?", (10, 1)).await?;
//!         conn.execute("UPDATE accounts SET balance = balance + ? WHERE id = ?", (10, 2)).await?;
//!         Ok(())
//!     })
//! })
//! .await?;
//!
//! pool.close_all().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{ConnectionParams, PoolSettings, Settings};
use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::traits::IntoParams;

struct IdleConnection {
    conn: Connection,
    last_used: Instant,
}

struct PoolState {
    /// Oldest at the front
    idle: VecDeque<IdleConnection>,
    /// Liveness flags of leased connections, by connection id
    leased: HashMap<u64, Arc<AtomicBool>>,
    /// Idle + leased + being opened
    total: usize,
    closed: bool,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    params: Arc<ConnectionParams>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    semaphore: Arc<Semaphore>,
}

/// A slot in `total` reserved for a connection being opened. Gives the
/// slot back if the open fails or is cancelled.
struct Reservation<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().total -= 1;
        }
    }
}

/// A connection the pool still counts in `total` while it awaits on the
/// connection's behalf. Dropped before [`take`](Self::take), it is reclaimed
/// like a dropped lease.
struct Counted<'a> {
    pool: &'a PoolInner,
    conn: Option<Connection>,
}

impl<'a> Counted<'a> {
    fn new(pool: &'a PoolInner, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    fn get_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until taken")
    }

    fn take(mut self) -> Connection {
        self.conn.take().expect("connection present until taken")
    }
}

impl Drop for Counted<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.reclaim(conn);
        }
    }
}

enum Checkout<'a> {
    Reuse(Counted<'a>),
    Open,
}

impl PoolInner {
    fn reserve(&self, state: &mut PoolState) -> Reservation<'_> {
        state.total += 1;
        Reservation {
            pool: self,
            armed: true,
        }
    }

    async fn open(&self) -> Result<Connection> {
        Connection::open_shared(self.driver.as_ref(), Arc::clone(&self.params)).await
    }

    /// Open one connection straight into the idle set, if still below `min_connections`.
    async fn replenish(&self) -> Result<()> {
        let reservation = {
            let mut state = self.state.lock();
            if state.closed || state.total >= self.settings.min_connections {
                return Ok(());
            }
            self.reserve(&mut state)
        };
        let conn = self.open().await?;

        let mut state = self.state.lock();
        reservation.keep();
        if state.closed {
            state.total -= 1;
            return Ok(());
        }
        state.idle.push_back(IdleConnection {
            conn,
            last_used: Instant::now(),
        });
        Ok(())
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match self.settings.acquire_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                Error::PoolExhausted {
                    max_connections: self.settings.max_connections,
                    timeout,
                }
            })?,
            None => acquire.await,
        };
        permit.map_err(|_| Error::PoolClosed)
    }

    /// Pop expired idle connections, oldest first, keeping `min_connections`.
    fn evict_expired(&self, state: &mut PoolState, evicted: &mut Vec<Connection>) {
        let Some(ttl) = self.settings.idle_timeout() else {
            return;
        };
        while state.total > self.settings.min_connections {
            match state.idle.front() {
                Some(entry) if entry.last_used.elapsed() >= ttl => {}
                _ => break,
            }
            if let Some(entry) = state.idle.pop_front() {
                state.total -= 1;
                evicted.push(entry.conn);
            }
        }
    }

    async fn discard(&self, mut conn: Connection) {
        let id = conn.id();
        if let Err(e) = conn.close().await {
            warn!(conn_id = id, error = %e, "Failed to close discarded connection");
        }
    }

    /// Return a leased connection: roll back leftover work, then keep it
    /// idle or replace it.
    async fn put_back(&self, conn: Connection) {
        self.state.lock().leased.remove(&conn.id());
        let mut slot = Counted::new(self, conn);

        let mut healthy = !slot.get_mut().is_closed();
        if healthy && slot.get_mut().in_transaction() {
            if let Err(e) = slot.get_mut().rollback().await {
                warn!(conn_id = slot.get_mut().id(), error = %e, "Rollback on release failed");
                healthy = false;
            }
        }

        let conn = slot.take();
        let replenish = {
            let mut state = self.state.lock();
            if healthy && !state.closed {
                debug!(conn_id = conn.id(), "Connection released to idle");
                state.idle.push_back(IdleConnection {
                    conn,
                    last_used: Instant::now(),
                });
                return;
            }
            state.total -= 1;
            !state.closed && state.total < self.settings.min_connections
        };

        debug!(conn_id = conn.id(), "Discarding released connection");
        self.discard(conn).await;
        if replenish {
            if let Err(e) = self.replenish().await {
                warn!(error = %e, "Failed to replace discarded connection");
            }
        }
    }

    /// Synchronous fallback for connections dropped mid-return: leases
    /// dropped without `release` and cancelled releases or acquires.
    fn reclaim(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.leased.remove(&conn.id());
        if !conn.is_closed() && !conn.in_transaction() && !state.closed {
            state.idle.push_back(IdleConnection {
                conn,
                last_used: Instant::now(),
            });
            return;
        }
        state.total -= 1;
        drop(state);
        // dropping the handle closes it; the database rolls back open work
        debug!(conn_id = conn.id(), "Dropped connection discarded");
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub leased: usize,
    /// Idle + leased + connections being opened
    pub total: usize,
    pub max_connections: usize,
    pub closed: bool,
}

/// A bounded pool of connections.
///
/// Cloning is cheap: clones share the same connections and limits.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a builder for a pool connecting with `params`.
    ///
    /// See [`ConnectionPoolBuilder`] for available options.
    pub fn builder(params: ConnectionParams) -> ConnectionPoolBuilder {
        ConnectionPoolBuilder::new(params)
    }

    /// Build a pool from loaded settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Self::builder(settings.connection.clone())
            .settings(settings.pool.clone())
            .build()
            .await
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Lease a connection.
    ///
    /// Reuses an idle connection when one is available, opens a new one
    /// while under `max_connections`, and otherwise waits. Fails with
    /// [`Error::PoolExhausted`] when the acquire timeout elapses and with
    /// [`Error::PoolClosed`] after [`close_all`](Self::close_all).
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let inner = &self.inner;
        if inner.state.lock().closed {
            return Err(Error::PoolClosed);
        }
        let permit = inner.acquire_permit().await?;

        let mut evicted = Vec::new();
        let (checkout, reservation) = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            inner.evict_expired(&mut state, &mut evicted);
            loop {
                match state.idle.pop_back() {
                    Some(entry) if entry.conn.is_closed() => {
                        state.total -= 1;
                        evicted.push(entry.conn);
                    }
                    Some(entry) => {
                        break (Checkout::Reuse(Counted::new(inner, entry.conn)), None)
                    }
                    None => break (Checkout::Open, Some(inner.reserve(&mut state))),
                }
            }
        };

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicting idle connections");
        }
        for conn in evicted {
            inner.discard(conn).await;
        }

        let conn = match checkout {
            Checkout::Reuse(slot) => slot.take(),
            Checkout::Open => inner.open().await?,
        };

        let registered = {
            let mut state = inner.state.lock();
            if let Some(reservation) = reservation {
                reservation.keep();
            }
            if state.closed {
                state.total -= 1;
                false
            } else {
                state.leased.insert(conn.id(), conn.alive_flag());
                true
            }
        };
        if !registered {
            inner.discard(conn).await;
            return Err(Error::PoolClosed);
        }
        debug!(conn_id = conn.id(), "Connection leased");

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Run `f` with a leased connection and release it afterwards,
    /// whatever `f` returns.
    pub async fn connection<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<R>> + Send,
        R: Send,
    {
        let mut lease = self.acquire().await?;
        let result = f(&mut *lease).await;
        lease.release().await;
        result
    }

    /// Run `f` inside a transaction on a leased connection.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`, and
    /// releases the connection after either.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<R>> + Send,
        R: Send,
    {
        let mut lease = self.acquire().await?;
        let result = run_in_transaction(&mut lease, f).await;
        lease.release().await;
        result
    }

    /// Execute one statement on a leased connection and commit it.
    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<Cursor> {
        let mut lease = self.acquire().await?;
        let result = async {
            let cursor = lease.execute(sql, params).await?;
            lease.commit().await?;
            Ok::<_, Error>(cursor)
        }
        .await;
        lease.release().await;
        result
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            leased: state.leased.len(),
            total: state.total,
            max_connections: self.inner.settings.max_connections,
            closed: state.closed,
        }
    }

    /// Shut the pool down.
    ///
    /// Idle connections are closed now. Leased connections are marked
    /// closed, so their operations fail with [`Error::ConnectionClosed`],
    /// and their handles are closed when they come back. Waiters and later
    /// acquires fail with [`Error::PoolClosed`]. Calling it again does
    /// nothing.
    pub async fn close_all(&self) {
        let (idle, leased) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            for alive in state.leased.values() {
                alive.store(false, Ordering::Release);
            }
            let idle = std::mem::take(&mut state.idle);
            state.total -= idle.len();
            (idle, state.leased.len())
        };
        self.inner.semaphore.close();

        let closed = idle.len();
        for entry in idle {
            self.inner.discard(entry.conn).await;
        }
        info!(closed, leased, "Connection pool closed");
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("driver", &self.inner.driver.name())
            .field("status", &self.status())
            .finish()
    }
}

async fn run_in_transaction<F, R>(conn: &mut Connection, f: F) -> Result<R>
where
    F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<R>> + Send,
    R: Send,
{
    conn.begin().await?;
    let failure = match f(conn).await {
        Ok(value) => match conn.commit().await {
            Ok(()) => return Ok(value),
            Err(e) => e,
        },
        Err(e) => e,
    };
    if let Err(rollback_err) = conn.rollback().await {
        warn!(conn_id = conn.id(), error = %rollback_err, "Rollback after failed transaction failed");
    }
    Err(failure)
}

/// A leased connection.
///
/// Derefs to [`Connection`]. Give it back with
/// [`release`](Self::release); a lease that is simply dropped goes back to
/// the idle set only when it holds no open transaction, and is discarded
/// otherwise.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Return the connection to the pool, rolling back uncommitted work.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn).await;
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.reclaim(conn);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}

/// Builder for a [`ConnectionPool`].
///
/// ```no_run
/// use std::time::Duration;
/// use llamadb::{ConnectionParams, ConnectionPool};
///
/// # async fn demo() -> llamadb::Result<()> {
/// let pool = ConnectionPool::builder(ConnectionParams::sqlite("app.db"))
///     .min_connections(2)
///     .max_connections(8)
///     .acquire_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPoolBuilder {
    params: ConnectionParams,
    settings: PoolSettings,
    driver: Option<Arc<dyn Driver>>,
}

impl ConnectionPoolBuilder {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            settings: PoolSettings::default(),
            driver: None,
        }
    }

    /// Replace all sizing and timing options at once.
    pub fn settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.settings.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.settings.max_connections = max;
        self
    }

    /// How long `acquire` waits for a free connection.
    /// `Duration::ZERO` waits indefinitely.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.settings.acquire_timeout_ms = duration_ms(timeout);
        self
    }

    /// How long a connection may sit idle before it is closed.
    /// `Duration::ZERO` disables eviction.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout_ms = duration_ms(timeout);
        self
    }

    /// Use a custom driver instead of the built-in one for `params.driver`.
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Validate the settings and open `min_connections` connections.
    pub async fn build(self) -> Result<ConnectionPool> {
        self.settings.validate()?;
        let driver = match self.driver {
            Some(driver) => driver,
            None => self.params.driver.driver()?,
        };

        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(self.settings.max_connections)),
            driver,
            params: Arc::new(self.params),
            settings: self.settings,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                leased: HashMap::new(),
                total: 0,
                closed: false,
            }),
        });

        for _ in 0..inner.settings.min_connections {
            inner.replenish().await?;
        }

        info!(
            driver = inner.driver.name(),
            min_connections = inner.settings.min_connections,
            max_connections = inner.settings.max_connections,
            "Connection pool ready"
        );
        Ok(ConnectionPool { inner })
    }
}

fn duration_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
