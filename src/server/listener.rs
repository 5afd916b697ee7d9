use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::http::creator::HttpResponseCreator;
use crate::server::acceptor::{Acceptor, TcpAcceptor};
use crate::server::connection::{Connection, ConnectionSettings, Outcome};
use crate::server::pool::ConnectionPool;
use crate::server::protocol::ResponseCreator;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept loop feeding a [`ConnectionPool`].
pub struct Server<A, C> {
    acceptor: A,
    creator: Arc<C>,
    pool: ConnectionPool,
    settings: ConnectionSettings,
    drain_timeout: Duration,
}

impl<A, C> Server<A, C>
where
    A: Acceptor,
    C: ResponseCreator,
{
    pub fn new(acceptor: A, creator: Arc<C>, settings: ConnectionSettings) -> Self {
        Self {
            acceptor,
            creator,
            pool: ConnectionPool::new(),
            settings,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn acceptor(&self) -> &A {
        &self.acceptor
    }

    /// Accepts one connection and starts it.
    ///
    /// A failed accept is logged and yields `Ok(None)` while the acceptor is
    /// still open; once it is closed the failure is returned.
    pub async fn accept_one(&mut self) -> Result<Option<JoinHandle<Outcome>>, ServerError> {
        match self.acceptor.accept().await {
            Ok((stream, peer)) => {
                info!("Accepted connection from {}", peer);

                let connection = Connection::new(
                    stream,
                    peer,
                    Arc::clone(&self.creator),
                    self.pool.clone(),
                    &self.settings,
                );
                Ok(Some(self.pool.start(connection).await))
            }
            Err(e) if self.acceptor.is_open() => {
                warn!(error = %e, "Failed to accept connection");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Acceptor is no longer usable");
                Err(ServerError::AcceptorClosed(e))
            }
        }
    }

    /// Runs until the acceptor fails fatally.
    pub async fn accept_loop(&mut self) -> Result<(), ServerError> {
        loop {
            self.accept_one().await?;
        }
    }

    /// Runs the accept loop until `shutdown` resolves, then stops every connection.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            res = self.accept_loop() => res,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        self.shutdown().await;
        result
    }

    /// Stops all connections and waits, up to the drain timeout, for their tasks.
    pub async fn shutdown(&self) {
        self.pool.stop_all().await;

        if tokio::time::timeout(self.drain_timeout, self.pool.wait_closed())
            .await
            .is_err()
        {
            warn!(
                remaining = self.pool.live_tasks(),
                "Timed out waiting for connections to close"
            );
        }
    }
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let addr = cfg.server.listen_addr()?;
    let acceptor = TcpAcceptor::bind(&addr).await?;
    info!("Listening on {}", addr);

    let server = Server::new(
        acceptor,
        Arc::new(HttpResponseCreator::default()),
        ConnectionSettings::from_config(&cfg.server),
    )
    .with_drain_timeout(cfg.server.drain_timeout());

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
