use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::server::pool::ConnectionPool;
use crate::server::protocol::{Encode, ParseStatus, RequestParser, ResponseCreator, StockReason};
use crate::server::timer::RequestTimer;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a connection, used as the pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a single transaction.
///
/// ```text
///   Accepted ──► Reading ──► Responding ──► Writing ──► Stopped
///                   │  ▲          │                        ▲
///                   └──┘          └── creator failure ─────┤
///               need data                                  │
///   (any state) ── stop / transport error / peer closed ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Accepted = 0,
    Reading = 1,
    Responding = 2,
    Writing = 3,
    Stopped = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Accepted,
            1 => Self::Reading,
            2 => Self::Responding,
            3 => Self::Writing,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::Reading => "reading",
            Self::Responding => "responding",
            Self::Writing => "writing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The normal response was fully written.
    Completed,
    /// A stock request-timeout response was fully written.
    TimedOut,
    /// A stock client-error response was fully written.
    Rejected,
    /// The peer closed before the request was complete.
    PeerClosed,
    /// A read or write failed.
    TransportError,
    /// The response creator failed; nothing was written.
    ResponseFailed,
    /// Stopped from outside (shutdown or pool stop).
    Stopped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Rejected => "rejected",
            Self::PeerClosed => "peer closed",
            Self::TransportError => "transport error",
            Self::ResponseFailed => "response failed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The part of a connection shared between its task and the pool.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    state: AtomicU8,
    finalizing: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl ConnectionHandle {
    fn new(peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::next(),
            peer,
            state: AtomicU8::new(ConnectionState::Accepted as u8),
            finalizing: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the outcome of the transaction has been decided.
    pub fn is_finalizing(&self) -> bool {
        self.finalizing.load(Ordering::Acquire)
    }

    /// Test-and-set: only the first caller gets `true`.
    fn begin_finalizing(&self) -> bool {
        !self.finalizing.swap(true, Ordering::AcqRel)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Asks the connection task to tear down.
    ///
    /// Idempotent: returns `true` only for the first call.
    pub fn stop(&self) -> bool {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        // notify_one keeps a permit if the task is not parked on the signal yet
        self.stop_notify.notify_one();
        true
    }
}

/// Per-connection settings derived from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub request_timeout: Option<Duration>,
    pub read_buffer_size: usize,
}

impl ConnectionSettings {
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self {
            request_timeout: cfg.request_timeout(),
            read_buffer_size: cfg.read_buffer_size.max(1),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

#[derive(Debug)]
pub(crate) enum Event {
    Read(io::Result<usize>),
    Written(io::Result<usize>),
    TimerFired,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Read,
    Write,
    Finish(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Normal,
    Stock(StockReason),
}

impl Reply {
    fn outcome(self) -> Outcome {
        match self {
            Reply::Normal => Outcome::Completed,
            Reply::Stock(StockReason::ClientError) => Outcome::Rejected,
            Reply::Stock(StockReason::RequestTimeout) => Outcome::TimedOut,
        }
    }
}

/// One accepted socket driven through a single request/response transaction.
pub struct Connection<S, C: ResponseCreator> {
    handle: Arc<ConnectionHandle>,
    stream: S,
    creator: Arc<C>,
    pool: ConnectionPool,
    parser: C::Parser,
    timer: RequestTimer,
    read_buf: BytesMut,
    write_buf: BytesMut,
    reply: Option<Reply>,
}

impl<S, C> Connection<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: ResponseCreator,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        creator: Arc<C>,
        pool: ConnectionPool,
        settings: &ConnectionSettings,
    ) -> Self {
        let mut parser = creator.create_parser();
        parser.init_model();

        Self {
            handle: Arc::new(ConnectionHandle::new(peer)),
            stream,
            creator,
            pool,
            parser,
            timer: RequestTimer::new(settings.request_timeout),
            read_buf: BytesMut::with_capacity(settings.read_buffer_size),
            write_buf: BytesMut::new(),
            reply: None,
        }
    }

    pub fn handle(&self) -> Arc<ConnectionHandle> {
        Arc::clone(&self.handle)
    }

    /// Runs the transaction to completion and releases the socket and timer.
    pub async fn run(mut self) -> Outcome {
        let mut step = self.begin();

        let outcome = loop {
            let event = match step {
                Step::Finish(outcome) => break outcome,
                Step::Read => self.next_read_event().await,
                Step::Write => self.next_write_event().await,
            };

            if let Some(next) = self.on_event(event) {
                step = next;
            }
        };

        self.close(outcome).await;
        outcome
    }

    pub(crate) fn begin(&mut self) -> Step {
        self.timer.setup();
        self.handle.set_state(ConnectionState::Reading);

        debug!(
            conn = %self.handle.id,
            peer = %self.handle.peer,
            timer_armed = self.timer.is_armed(),
            "Connection started"
        );

        Step::Read
    }

    async fn next_read_event(&mut self) -> Event {
        if self.handle.is_stop_requested() {
            return Event::StopRequested;
        }

        tokio::select! {
            biased;
            _ = self.handle.stop_notify.notified() => Event::StopRequested,
            res = self.stream.read_buf(&mut self.read_buf) => Event::Read(res),
            _ = self.timer.expired() => Event::TimerFired,
        }
    }

    async fn next_write_event(&mut self) -> Event {
        if self.handle.is_stop_requested() {
            return Event::StopRequested;
        }

        tokio::select! {
            biased;
            _ = self.handle.stop_notify.notified() => Event::StopRequested,
            res = self.stream.write(&self.write_buf[..]) => Event::Written(res),
        }
    }

    /// Applies one event. `None` means the event was stale and nothing changed.
    pub(crate) fn on_event(&mut self, event: Event) -> Option<Step> {
        match event {
            Event::StopRequested => {
                debug!(conn = %self.handle.id, state = %self.handle.state(), "Stop requested");
                Some(self.finish(Outcome::Stopped))
            }
            Event::TimerFired => self.on_timer_fired(),
            Event::Read(res) => self.on_read(res),
            Event::Written(res) => self.on_written(res),
        }
    }

    fn on_timer_fired(&mut self) -> Option<Step> {
        // Disarm first so an ignored expiry cannot fire again.
        let was_armed = self.timer.fire();

        if !was_armed
            || self.handle.state() != ConnectionState::Reading
            || !self.handle.begin_finalizing()
        {
            debug!(
                conn = %self.handle.id,
                state = %self.handle.state(),
                "Ignoring stale request timeout"
            );
            return None;
        }

        info!(conn = %self.handle.id, peer = %self.handle.peer, "Request timed out");
        Some(self.respond(Reply::Stock(StockReason::RequestTimeout)))
    }

    fn on_read(&mut self, res: io::Result<usize>) -> Option<Step> {
        if self.handle.state() != ConnectionState::Reading {
            debug!(
                conn = %self.handle.id,
                state = %self.handle.state(),
                "Ignoring stale read completion"
            );
            return None;
        }

        let n = match res {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Some(Step::Read),
            Err(_) if self.handle.is_stop_requested() => return Some(self.finish(Outcome::Stopped)),
            Err(e) => {
                warn!(conn = %self.handle.id, error = %e, "Read failed");
                return Some(self.finish(Outcome::TransportError));
            }
        };

        let len = n.min(self.read_buf.len());
        self.parser.post_buffer(&self.read_buf[..len]);
        self.read_buf.clear();

        match self.parser.poll() {
            ParseStatus::NeedData if n == 0 => {
                debug!(conn = %self.handle.id, "Peer closed before the request was complete");
                Some(self.finish(Outcome::PeerClosed))
            }
            ParseStatus::NeedData => Some(Step::Read),
            ParseStatus::Complete => {
                if !self.handle.begin_finalizing() {
                    return None;
                }
                self.timer.cancel();
                Some(self.respond(Reply::Normal))
            }
            ParseStatus::Error(reason) => {
                if !self.handle.begin_finalizing() {
                    return None;
                }
                self.timer.cancel();
                warn!(
                    conn = %self.handle.id,
                    peer = %self.handle.peer,
                    reason = %reason,
                    "Malformed request"
                );
                Some(self.respond(Reply::Stock(StockReason::ClientError)))
            }
        }
    }

    fn respond(&mut self, reply: Reply) -> Step {
        self.handle.set_state(ConnectionState::Responding);

        let created = match reply {
            Reply::Normal => match self.parser.request() {
                Some(request) => self.creator.create_response(request),
                None => Err(anyhow::anyhow!("parser completed without a request")),
            },
            Reply::Stock(reason) => self
                .creator
                .create_stock_response(self.parser.request(), reason),
        };

        let response = match created {
            Ok(response) => response,
            Err(e) => {
                error!(conn = %self.handle.id, error = %e, "Failed to create response");
                return self.finish(Outcome::ResponseFailed);
            }
        };

        self.write_buf.clear();
        response.encode(&mut self.write_buf);
        self.reply = Some(reply);

        if self.write_buf.is_empty() {
            return self.finish(reply.outcome());
        }

        self.handle.set_state(ConnectionState::Writing);
        Step::Write
    }

    fn on_written(&mut self, res: io::Result<usize>) -> Option<Step> {
        if self.handle.state() != ConnectionState::Writing {
            debug!(
                conn = %self.handle.id,
                state = %self.handle.state(),
                "Ignoring stale write completion"
            );
            return None;
        }

        match res {
            Ok(0) => {
                warn!(conn = %self.handle.id, "Connection closed while writing");
                Some(self.finish(Outcome::TransportError))
            }
            Ok(n) => {
                let n = n.min(self.write_buf.len());
                self.write_buf.advance(n);

                if !self.write_buf.is_empty() {
                    return Some(Step::Write);
                }

                let outcome = self.reply.map_or(Outcome::Completed, Reply::outcome);
                Some(self.finish(outcome))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Some(Step::Write),
            Err(_) if self.handle.is_stop_requested() => Some(self.finish(Outcome::Stopped)),
            Err(e) => {
                warn!(conn = %self.handle.id, error = %e, "Write failed");
                Some(self.finish(Outcome::TransportError))
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Step {
        self.handle.begin_finalizing();
        self.handle.set_state(ConnectionState::Stopped);
        Step::Finish(outcome)
    }

    async fn close(&mut self, outcome: Outcome) {
        // Leave the pool before releasing anything.
        self.pool.stop(&self.handle).await;

        if self.timer.cancel() {
            debug!(conn = %self.handle.id, "Request timer cancelled");
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!(conn = %self.handle.id, error = %e, "Ignoring error while closing socket");
        }

        info!(
            conn = %self.handle.id,
            peer = %self.handle.peer,
            outcome = %outcome,
            "Connection closed"
        );
    }
}
