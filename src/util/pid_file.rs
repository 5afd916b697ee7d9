use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PidFileError;

/// PID file guarding against two instances running at once.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the PID recorded in the file if that process is still running.
    ///
    /// A missing file means no instance is running. A file that does not
    /// hold a PID is an error.
    pub fn check(&self) -> Result<Option<u32>, PidFileError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return Ok(None),
        };

        let pid: u32 = text
            .trim()
            .parse()
            .map_err(|_| PidFileError::CantReadPid(self.path.clone()))?;

        if process_alive(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    /// Records the current process.
    pub fn write(&self) -> Result<(), PidFileError> {
        self.write_pid(std::process::id())
    }

    pub fn write_pid(&self, pid: u32) -> Result<(), PidFileError> {
        fs::write(&self.path, format!("{}\n", pid)).map_err(|source| PidFileError::Io {
            action: "write",
            path: self.path.clone(),
            source,
        })
    }

    /// Removes the file; a file that is already gone is not an error.
    pub fn delete(&self) -> Result<(), PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PidFileError::Io {
                action: "delete",
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without procfs there is no cheap liveness check; trust the file.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
