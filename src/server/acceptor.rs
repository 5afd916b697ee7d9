use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, warn};

/// Pause before retrying after the process ran out of descriptors or memory.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of newly accepted connections.
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Resolves once per accepted connection or accept failure.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;

    /// `false` once the listening socket can no longer accept.
    fn is_open(&self) -> bool;
}

/// How an accept failure affects the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorKind {
    /// The listening socket itself is unusable.
    Fatal,
    /// Out of descriptors, buffers or memory; retry after a pause.
    Exhausted,
    /// Specific to the connection being accepted.
    Transient,
}

#[cfg(unix)]
mod errno {
    pub use libc::{EBADF, EINVAL, EMFILE, ENFILE, ENOBUFS, ENOMEM, ENOTSOCK};

    pub const FATAL: &[i32] = &[EBADF, EINVAL, ENOTSOCK];
    pub const EXHAUSTED: &[i32] = &[EMFILE, ENFILE, ENOBUFS, ENOMEM];
}

#[cfg(not(unix))]
mod errno {
    pub const FATAL: &[i32] = &[];
    pub const EXHAUSTED: &[i32] = &[];
}

pub fn classify_accept_error(err: &io::Error) -> AcceptErrorKind {
    if let Some(code) = err.raw_os_error() {
        if errno::FATAL.contains(&code) {
            return AcceptErrorKind::Fatal;
        }
        if errno::EXHAUSTED.contains(&code) {
            return AcceptErrorKind::Exhausted;
        }
    }

    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected => AcceptErrorKind::Fatal,
        io::ErrorKind::OutOfMemory => AcceptErrorKind::Exhausted,
        _ => AcceptErrorKind::Transient,
    }
}

/// TCP listening socket.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: Option<TcpListener>,
}

impl TcpAcceptor {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(closed()),
        }
    }

    /// Closes the listening socket; later accepts fail.
    pub fn close(&mut self) {
        self.listener = None;
    }

    /// Closes the listener on fatal errors and pauses on exhaustion.
    async fn on_accept_error(&mut self, err: io::Error) -> io::Error {
        match classify_accept_error(&err) {
            AcceptErrorKind::Fatal => {
                error!(error = %err, "Listening socket is unusable, closing it");
                self.close();
            }
            AcceptErrorKind::Exhausted => {
                warn!(
                    error = %err,
                    backoff_ms = ACCEPT_BACKOFF.as_millis() as u64,
                    "Out of resources while accepting"
                );
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
            AcceptErrorKind::Transient => {}
        }
        err
    }
}

impl Acceptor for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let res = match &self.listener {
            Some(listener) => listener.accept().await,
            None => return Err(closed()),
        };

        match res {
            Ok(accepted) => Ok(accepted),
            Err(e) => Err(self.on_accept_error(e).await),
        }
    }

    fn is_open(&self) -> bool {
        self.listener.is_some()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "acceptor is closed")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::time::Instant;

    async fn bound() -> TcpAcceptor {
        TcpAcceptor::bind("127.0.0.1:0").await.unwrap()
    }

    fn os(code: i32) -> AcceptErrorKind {
        classify_accept_error(&io::Error::from_raw_os_error(code))
    }

    #[test]
    fn classifies_accept_errors() {
        assert_eq!(os(errno::EBADF), AcceptErrorKind::Fatal);
        assert_eq!(os(errno::EINVAL), AcceptErrorKind::Fatal);
        assert_eq!(os(errno::ENOTSOCK), AcceptErrorKind::Fatal);
        assert_eq!(os(errno::EMFILE), AcceptErrorKind::Exhausted);
        assert_eq!(os(errno::ENFILE), AcceptErrorKind::Exhausted);
        assert_eq!(os(errno::ENOBUFS), AcceptErrorKind::Exhausted);

        let aborted = io::Error::new(io::ErrorKind::ConnectionAborted, "aborted");
        assert_eq!(classify_accept_error(&aborted), AcceptErrorKind::Transient);
    }

    #[tokio::test]
    async fn fatal_error_closes_listener() {
        let mut acceptor = bound().await;

        acceptor
            .on_accept_error(io::Error::from_raw_os_error(errno::EBADF))
            .await;

        assert!(!acceptor.is_open());
        assert!(acceptor.accept().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_backs_off_and_stays_open() {
        let mut acceptor = bound().await;
        let start = Instant::now();

        acceptor
            .on_accept_error(io::Error::from_raw_os_error(errno::EMFILE))
            .await;

        assert!(start.elapsed() >= ACCEPT_BACKOFF);
        assert!(acceptor.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_returns_immediately() {
        let mut acceptor = bound().await;
        let start = Instant::now();

        acceptor
            .on_accept_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(acceptor.is_open());
    }
}
