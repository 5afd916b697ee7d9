//! ctrl-agent - Control channel transport
//!
//! Connection lifecycle, connection pool and the accept loop for the
//! management daemon's control channel, plus a default HTTP/1.1 plug-in.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod util;
