//! Bounded access to the host's procfs and sysfs trees.

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

/// Host filesystem view rooted at a configurable directory.
///
/// All reads are bounded by the backend timeout so a wedged sysfs attribute
/// cannot stall a tick.
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
    timeout: Duration,
}

impl Host {
    /// Creates a view of the filesystem under `root`.
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// Maps an absolute host path such as `/proc/stat` under the root.
    pub fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    /// Reads a file and returns its trimmed content.
    pub async fn read(&self, path: &Path) -> Result<String> {
        match timeout(self.timeout, tokio::fs::read_to_string(path)).await {
            Err(_) => Err(Error::BackendTimeout {
                backend: path.display().to_string(),
                timeout: self.timeout,
            }),
            Ok(Ok(content)) => Ok(content.trim().to_string()),
            Ok(Err(e)) => Err(io_error(path, e)),
        }
    }

    /// Reads a file holding a single unsigned integer.
    pub async fn read_u64(&self, path: &Path) -> Result<u64> {
        let content = self.read(path).await?;
        content.parse().map_err(|_| {
            Error::parse(
                path.display().to_string(),
                format!("expected unsigned integer, got '{}'", content),
            )
        })
    }

    /// Lists the entry names of a directory, sorted.
    pub async fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let listing = async {
            let mut entries = tokio::fs::read_dir(path).await?;
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
            Ok::<_, std::io::Error>(names)
        };
        match timeout(self.timeout, listing).await {
            Err(_) => Err(Error::BackendTimeout {
                backend: path.display().to_string(),
                timeout: self.timeout,
            }),
            Ok(Ok(mut names)) => {
                names.sort();
                Ok(names)
            }
            Ok(Err(e)) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::unavailable(path.display().to_string(), "not present"),
        ErrorKind::PermissionDenied => Error::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    }
}
