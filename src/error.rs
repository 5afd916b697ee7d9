//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid listen address '{0}'")]
    InvalidListen(String),

    #[error("read buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("unknown log level '{0}'")]
    InvalidLogLevel(String),
}

/// Errors surfaced by the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket is no longer usable; the caller decides whether to shut down.
    #[error("acceptor is closed: {0}")]
    AcceptorClosed(#[source] io::Error),
}

/// Errors raised by [`PidFile`](crate::util::pid_file::PidFile).
#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("unable to read PID from file '{0}'")]
    CantReadPid(PathBuf),

    #[error("unable to {action} PID file '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
