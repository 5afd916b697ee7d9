//! Connection lifecycle and the accept loop.
//!
//! Each accepted socket becomes a [`Connection`] owned by its own task and
//! registered in the [`ConnectionPool`]. The task reads until the
//! [`RequestParser`] is satisfied, asks the [`ResponseCreator`] for a
//! response, writes it and closes. A single-shot [`RequestTimer`] races the
//! read; if it wins, a stock timeout response is written instead.
//!
//! Every exit path converges on the same teardown: leave the pool, cancel
//! the timer, close the socket.

pub mod acceptor;
pub mod connection;
pub mod listener;
pub mod pool;
pub mod protocol;
pub mod timer;

pub use acceptor::{Acceptor, TcpAcceptor};
pub use connection::{
    Connection, ConnectionHandle, ConnectionId, ConnectionSettings, ConnectionState, Outcome,
};
pub use listener::Server;
pub use pool::ConnectionPool;
pub use protocol::{Encode, ParseStatus, RequestParser, ResponseCreator, StockReason};
pub use timer::RequestTimer;
