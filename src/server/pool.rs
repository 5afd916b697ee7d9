//! Live connection set.
//!
//! Membership is the single source of truth for whether a connection is
//! still valid: a connection joins in [`ConnectionPool::start`] and leaves the
//! moment its teardown begins, whether that teardown was triggered by the
//! connection itself or by [`ConnectionPool::stop_all`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::server::connection::{Connection, ConnectionHandle, ConnectionId, Outcome};
use crate::server::protocol::ResponseCreator;

#[derive(Debug, Default)]
struct PoolInner {
    members: Mutex<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    live_tasks: AtomicUsize,
    all_closed: Notify,
}

/// Shared handle to the set of live connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` and spawns its task.
    ///
    /// The connection arms its timer and starts reading once the task runs.
    pub async fn start<S, C>(&self, connection: Connection<S, C>) -> JoinHandle<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        C: ResponseCreator,
    {
        let handle = connection.handle();

        let previous = self
            .inner
            .members
            .lock()
            .await
            .insert(handle.id(), Arc::clone(&handle));
        debug_assert!(previous.is_none(), "{} started twice", handle.id());

        debug!(conn = %handle.id(), peer = %handle.peer(), "Connection registered");

        let guard = LiveTask::new(Arc::clone(&self.inner));
        let pool = self.clone();
        tokio::spawn(async move {
            let _guard = guard;

            // A panic inside the connection (e.g. in a collaborator) unwinds
            // past its teardown; membership is released here instead.
            match tokio::spawn(connection.run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(conn = %handle.id(), error = %e, "Connection task failed");
                    pool.stop(&handle).await;
                    Outcome::ResponseFailed
                }
            }
        })
    }

    /// Removes the connection and asks it to stop.
    ///
    /// Returns `false`, doing nothing, if it was not a member.
    pub async fn stop(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let removed = self.inner.members.lock().await.remove(&handle.id());
        if removed.is_none() {
            return false;
        }

        handle.stop();
        debug!(conn = %handle.id(), "Connection deregistered");
        true
    }

    /// Stops every current member. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let snapshot: Vec<Arc<ConnectionHandle>> =
            self.inner.members.lock().await.values().cloned().collect();

        let mut stopped = 0;
        for handle in &snapshot {
            if self.stop(handle).await {
                stopped += 1;
            }
        }

        info!(stopped, "Stopped all connections");
        stopped
    }

    pub async fn size(&self) -> usize {
        self.inner.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.members.lock().await.contains_key(&id)
    }

    /// Connection tasks that have not finished their teardown yet.
    pub fn live_tasks(&self) -> usize {
        self.inner.live_tasks.load(Ordering::Acquire)
    }

    /// Waits until every spawned connection task has finished.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.inner.all_closed.notified();
            if self.live_tasks() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts a running connection task; wakes `wait_closed` when the last one ends.
struct LiveTask {
    inner: Arc<PoolInner>,
}

impl LiveTask {
    fn new(inner: Arc<PoolInner>) -> Self {
        inner.live_tasks.fetch_add(1, Ordering::AcqRel);
        Self { inner }
    }
}

impl Drop for LiveTask {
    fn drop(&mut self) {
        if self.inner.live_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.all_closed.notify_waiters();
        }
    }
}
