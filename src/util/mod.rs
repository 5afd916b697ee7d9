//! Process-level helpers for the daemon binary.

pub mod pid_file;

pub use pid_file::PidFile;
