//! Chain connection pool
//!
//! Owns zero-or-one live connection per GCI. Connections are created
//! lazily on first access; concurrent requests for the same uninitialized
//! GCI share a single in-flight connect attempt and its outcome, success
//! or failure. Failures are never cached, so the next access retries.
//!
//! The connect attempt runs in a spawned task: a caller disconnecting
//! mid-flight does not abort the attempt for the other waiters.
//!
//! Connections for distinct GCIs never serialize against each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Result, WicketError};

use super::{ChainConnection, Connector};

/// Outcome of a shared connect attempt, broadcast to every waiter.
/// Errors cross the channel as strings because broadcast requires Clone.
type ConnectOutcome = std::result::Result<Arc<dyn ChainConnection>, String>;

enum Slot {
    /// Live connection, usable until it signals failure
    Ready(Arc<dyn ChainConnection>),
    /// Connect attempt in flight; subscribers share its outcome
    Pending(broadcast::Sender<ConnectOutcome>),
}

/// Per-GCI connection pool
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the live connection for a GCI, connecting if necessary.
    ///
    /// Callers must not assume connection identity is stable across calls:
    /// an evicted connection is transparently replaced on the next access.
    pub async fn get(self: &Arc<Self>, gci: &str) -> Result<Arc<dyn ChainConnection>> {
        let mut rx = {
            let mut slots = self.slots.lock().await;
            match slots.get(gci) {
                Some(Slot::Ready(conn)) => return Ok(Arc::clone(conn)),
                Some(Slot::Pending(tx)) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    slots.insert(gci.to_string(), Slot::Pending(tx.clone()));

                    let pool = Arc::clone(self);
                    let gci = gci.to_string();
                    tokio::spawn(async move {
                        pool.drive_connect(gci, tx).await;
                    });

                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(message)) => Err(WicketError::Connection(message)),
            Err(_) => Err(WicketError::Connection(
                "connection attempt was dropped".into(),
            )),
        }
    }

    /// Query chain state at a path, evicting the connection on failure
    pub async fn query(self: &Arc<Self>, gci: &str, path: &str) -> Result<serde_json::Value> {
        let conn = self.get(gci).await?;
        match conn.get_state(path).await {
            Ok(value) => Ok(value),
            Err(err @ WicketError::Connection(_)) => {
                self.evict_connection(gci, &conn, "query failed").await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Submit a transaction, evicting the connection on failure
    pub async fn submit(self: &Arc<Self>, gci: &str, tx: &serde_json::Value) -> Result<serde_json::Value> {
        let conn = self.get(gci).await?;
        match conn.send_tx(tx).await {
            Ok(result) => Ok(result),
            Err(err @ WicketError::Connection(_)) => {
                self.evict_connection(gci, &conn, "send failed").await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Number of live (ready) connections
    pub async fn live_count(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Run the shared connect attempt for a GCI and broadcast the outcome
    async fn drive_connect(self: Arc<Self>, gci: String, tx: broadcast::Sender<ConnectOutcome>) {
        let result = self.connector.connect(&gci).await;

        let outcome = {
            let mut slots = self.slots.lock().await;
            match result {
                Ok(conn) => {
                    info!(gci = %gci, "Chain connection established");
                    slots.insert(gci.clone(), Slot::Ready(Arc::clone(&conn)));
                    self.spawn_eviction_watcher(gci.clone(), Arc::clone(&conn));
                    Ok(conn)
                }
                Err(err) => {
                    // Not cached: the next access retries from scratch
                    warn!(gci = %gci, error = %err, "Chain connection failed");
                    slots.remove(&gci);
                    Err(err.to_string())
                }
            }
        };

        // Receivers may all have dropped; that is fine
        let _ = tx.send(outcome);
    }

    /// Watch a connection's error signal and evict it when it dies
    fn spawn_eviction_watcher(self: &Arc<Self>, gci: String, conn: Arc<dyn ChainConnection>) {
        let pool = Arc::clone(self);
        let mut failed = conn.failed();
        tokio::spawn(async move {
            loop {
                if *failed.borrow() {
                    break;
                }
                // A dropped sender means the connection is gone too
                if failed.changed().await.is_err() {
                    break;
                }
            }
            pool.evict_connection(&gci, &conn, "connection signaled failure")
                .await;
        });
    }

    /// Remove a specific connection from the pool. A newer connection that
    /// already replaced it is left alone.
    async fn evict_connection(&self, gci: &str, conn: &Arc<dyn ChainConnection>, reason: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(Slot::Ready(current)) = slots.get(gci) {
            if Arc::ptr_eq(current, conn) {
                slots.remove(gci);
                debug!(gci = %gci, reason = %reason, "Evicted chain connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;

    struct StubConnection {
        state: Value,
        fail_requests: AtomicBool,
        failed_tx: watch::Sender<bool>,
        failed_rx: watch::Receiver<bool>,
    }

    impl StubConnection {
        fn new(state: Value) -> Self {
            let (failed_tx, failed_rx) = watch::channel(false);
            Self {
                state,
                fail_requests: AtomicBool::new(false),
                failed_tx,
                failed_rx,
            }
        }
    }

    #[async_trait]
    impl ChainConnection for StubConnection {
        async fn get_state(&self, path: &str) -> Result<Value> {
            if self.fail_requests.load(Ordering::SeqCst) {
                return Err(WicketError::Connection("stub request failure".into()));
            }
            Ok(self.state.get(path).cloned().unwrap_or(Value::Null))
        }

        async fn send_tx(&self, tx: &Value) -> Result<Value> {
            if self.fail_requests.load(Ordering::SeqCst) {
                return Err(WicketError::Connection("stub request failure".into()));
            }
            Ok(json!({ "ok": true, "tx": tx }))
        }

        fn failed(&self) -> watch::Receiver<bool> {
            self.failed_rx.clone()
        }
    }

    struct StubConnector {
        connects: AtomicUsize,
        connect_delay: Duration,
        fail_next: AtomicBool,
        last: Mutex<Option<Arc<StubConnection>>>,
    }

    impl StubConnector {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                connect_delay: Duration::from_millis(20),
                fail_next: AtomicBool::new(false),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, _gci: &str) -> Result<Arc<dyn ChainConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.connect_delay).await;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(WicketError::Connection("stub connect failure".into()));
            }
            let conn = Arc::new(StubConnection::new(json!({ "count": 0 })));
            *self.last.lock().await = Some(Arc::clone(&conn));
            Ok(conn)
        }
    }

    #[tokio::test]
    async fn test_concurrent_get_shares_one_connect() {
        let connector = Arc::new(StubConnector::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        let a = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get("chainA").await })
        };
        let b = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get("chainA").await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_gcis_connect_independently() {
        let connector = Arc::new(StubConnector::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        pool.get("chainA").await.unwrap();
        pool.get("chainB").await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_cached() {
        let connector = Arc::new(StubConnector::new());
        connector.fail_next.store(true, Ordering::SeqCst);
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        let first = pool.get("chainA").await;
        assert!(matches!(first, Err(WicketError::Connection(_))));
        assert_eq!(pool.live_count().await, 0);

        // Next access retries and succeeds
        assert!(pool.get("chainA").await.is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_failure() {
        let connector = Arc::new(StubConnector::new());
        connector.fail_next.store(true, Ordering::SeqCst);
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        let a = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get("chainA").await })
        };
        let b = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get("chainA").await })
        };

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
        // Both waiters shared the single failed attempt
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_signal_evicts() {
        let connector = Arc::new(StubConnector::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        pool.get("chainA").await.unwrap();
        assert_eq!(pool.live_count().await, 1);

        let conn = connector.last.lock().await.clone().unwrap();
        conn.failed_tx.send(true).unwrap();

        // Give the watcher a moment to run
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.live_count().await, 0);

        // Next access re-establishes
        pool.get("chainA").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_evicts_on_connection_error() {
        let connector = Arc::new(StubConnector::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        let value = pool.query("chainA", "count").await.unwrap();
        assert_eq!(value, json!(0));

        let conn = connector.last.lock().await.clone().unwrap();
        conn.fail_requests.store(true, Ordering::SeqCst);

        assert!(pool.query("chainA", "count").await.is_err());
        assert_eq!(pool.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_submit_delegates() {
        let connector = Arc::new(StubConnector::new());
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&connector) as Arc<dyn Connector>));

        let result = pool.submit("chainA", &json!({"amount": 5})).await.unwrap();
        assert_eq!(result["ok"], json!(true));
    }
}
