//! Bounded pool of Kaspa RPC sessions.
//!
//! Sessions are created lazily up to `max_size`. Idle sessions sit in a
//! bounded channel; the number of sessions alive (idle or borrowed) is
//! tracked by an atomic counter that never exceeds `max_size`.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::client::{ClientError, Connector, LedgerConnection};

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const MAX_POOL_SIZE: usize = 50;
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timeout waiting for available connection after {0:?}")]
    Timeout(Duration),
    #[error("connection pool is shut down")]
    Closed,
    #[error(transparent)]
    Connect(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live sessions. Zero means [`DEFAULT_POOL_SIZE`];
    /// values above [`MAX_POOL_SIZE`] are clamped.
    pub size: usize,
    pub acquire_timeout: Duration,
    /// Not enforced yet; kept for eviction of long-idle sessions.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            acquire_timeout: CONNECTION_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

pub struct RpcClientPool<C: Connector> {
    connector: C,
    ready_tx: mpsc::Sender<C::Connection>,
    ready_rx: Mutex<mpsc::Receiver<C::Connection>>,
    created: AtomicUsize,
    max_size: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    closed: AtomicBool,
}

impl<C: Connector> RpcClientPool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        let max_size = match config.size {
            0 => DEFAULT_POOL_SIZE,
            n => n.min(MAX_POOL_SIZE),
        };
        let (ready_tx, ready_rx) = mpsc::channel(max_size);
        Self {
            connector,
            ready_tx,
            ready_rx: Mutex::new(ready_rx),
            created: AtomicUsize::new(0),
            max_size,
            acquire_timeout: config.acquire_timeout,
            idle_timeout: config.idle_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Sessions currently alive, idle or borrowed.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Borrow a session. It goes back to the pool when the guard drops.
    pub async fn acquire(&self) -> Result<PooledConnection<'_, C>, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        // A held lock means another task is already waiting on an empty set.
        if let Ok(mut rx) = self.ready_rx.try_lock() {
            if let Ok(conn) = rx.try_recv() {
                return Ok(self.guard(conn));
            }
        }

        if let Some(slot) = self.reserve_slot() {
            let conn = self.connector.connect().await?;
            slot.commit();
            debug!("Opened Kaspa RPC session ({}/{})", self.created(), self.max_size);
            return Ok(self.guard(conn));
        }

        let wait = async { self.ready_rx.lock().await.recv().await };
        match tokio::time::timeout(self.acquire_timeout, wait).await {
            Ok(Some(conn)) => Ok(self.guard(conn)),
            Ok(None) => Err(PoolError::Closed),
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for a Kaspa RPC session",
                    self.acquire_timeout
                );
                Err(PoolError::Timeout(self.acquire_timeout))
            }
        }
    }

    /// Return a session to the idle set, or close it if the set is full,
    /// the pool is shut down, or the session is dead.
    pub fn release(&self, conn: C::Connection) {
        if !conn.is_connected() {
            debug!("Dropping disconnected Kaspa RPC session");
            self.discard(conn);
            return;
        }
        match self.ready_tx.try_send(conn) {
            Ok(()) => {}
            Err(TrySendError::Full(conn)) | Err(TrySendError::Closed(conn)) => self.discard(conn),
        }
    }

    /// Close every idle session. Borrowed sessions are closed as their guards drop.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let mut rx = self.ready_rx.lock().await;
        rx.close();
        let mut closed = 0;
        while let Ok(conn) = rx.try_recv() {
            self.discard(conn);
            closed += 1;
        }
        info!("Connection pool shut down, closed {} idle sessions", closed);
    }

    fn discard(&self, conn: C::Connection) {
        self.created.fetch_sub(1, Ordering::AcqRel);
        conn.close();
    }

    fn reserve_slot(&self) -> Option<SlotReservation<'_>> {
        self.created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_size).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotReservation {
                created: &self.created,
                committed: false,
            })
    }

    fn guard(&self, conn: C::Connection) -> PooledConnection<'_, C> {
        PooledConnection {
            pool: self,
            conn: Some(conn),
        }
    }
}

/// Gives the counter slot back unless the connect attempt succeeded,
/// including when the acquiring future is dropped mid-connect.
struct SlotReservation<'a> {
    created: &'a AtomicUsize,
    committed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.created.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// A borrowed session; released to its pool on drop.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a RpcClientPool<C>,
    conn: Option<C::Connection>,
}

impl<C: Connector> PooledConnection<'_, C> {
    /// Close the session instead of returning it.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the connection, and both consume the guard.
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
