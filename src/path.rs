use crate::identity::ProcessIdentity;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where this process writes its log:
/// `<root>/YYYY/YYYYMM/YYYYMMDD/YYYYMMDD_HHMMSS_<program>_<pid>_<host>.log`.
///
/// Directory and file name are derived from the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilePath {
    dir: PathBuf,
    file: PathBuf,
}

impl LogFilePath {
    pub fn new(root: &Path, now: DateTime<Utc>, identity: &ProcessIdentity) -> Self {
        let dir = root
            .join(now.format("%Y").to_string())
            .join(now.format("%Y%m").to_string())
            .join(now.format("%Y%m%d").to_string());
        let name = format!(
            "{}_{}_{}_{}.log",
            now.format("%Y%m%d_%H%M%S"),
            identity.program,
            identity.pid,
            identity.hostname
        );
        let file = dir.join(name);
        Self { dir, file }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Create the date directories. An existing tree is not an error.
    pub fn create_dir(&self) -> io::Result<()> {
        match fs::create_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => Err(e),
            _ => Ok(()),
        }
    }
}
