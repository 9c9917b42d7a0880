//! Bounded invocation of external query tools.

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, timeout_at, Instant};

/// Locates and runs vendor tools with a time bound.
#[derive(Debug, Clone)]
pub struct Tools {
    dirs: Vec<PathBuf>,
    timeout: Duration,
}

impl Tools {
    /// Searches the directories listed in `PATH`.
    pub fn from_env(timeout: Duration) -> Self {
        let dirs = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::with_dirs(dirs, timeout)
    }

    /// Searches only the given directories.
    pub fn with_dirs(dirs: Vec<PathBuf>, timeout: Duration) -> Self {
        Self { dirs, timeout }
    }

    /// Returns the bound applied to every invocation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Finds an executable by name.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        self.dirs.iter().map(|d| d.join(name)).find(|p| {
            std::fs::metadata(p)
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
    }

    fn command(&self, name: &str, args: &[&str]) -> Result<Command> {
        let program = self
            .locate(name)
            .ok_or_else(|| Error::unavailable(name, "not found in PATH"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }

    /// Runs a tool to completion and returns its standard output.
    ///
    /// The child is killed if it outlives the timeout.
    pub async fn run(&self, name: &str, args: &[&str]) -> Result<String> {
        self.run_for(name, args, self.timeout).await
    }

    /// Like [`Tools::run`], for tools that need a different bound.
    pub async fn run_for(&self, name: &str, args: &[&str], bound: Duration) -> Result<String> {
        let mut cmd = self.command(name, args)?;
        let output = match timeout(bound, cmd.output()).await {
            Err(_) => {
                return Err(Error::BackendTimeout {
                    backend: name.to_string(),
                    timeout: bound,
                })
            }
            Ok(result) => result.map_err(|e| spawn_error(name, e))?,
        };
        if !output.status.success() {
            return Err(Error::unavailable(
                name,
                format!("exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Collects a streaming tool's output for at most `window`, then kills it.
    ///
    /// Used for tools that sample continuously and never exit on their own.
    /// Returns whatever was written before the window closed. Reading and
    /// reaping share one deadline.
    pub async fn capture(&self, name: &str, args: &[&str], window: Duration) -> Result<String> {
        let window = window.min(self.timeout);
        let deadline = Instant::now() + window;
        let mut child = self
            .command(name, args)?
            .spawn()
            .map_err(|e| spawn_error(name, e))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::unavailable(name, "no stdout"))?;

        let mut buf = Vec::new();
        let read = timeout_at(deadline, stdout.read_to_end(&mut buf)).await;
        match read {
            Ok(Ok(_)) => {
                let waited = timeout_at(deadline, child.wait()).await;
                match waited {
                    Ok(status) => {
                        let status = status?;
                        if !status.success() && buf.is_empty() {
                            return Err(Error::unavailable(
                                name,
                                format!("exited with {}", status),
                            ));
                        }
                    }
                    // Stdout closed but the process lingers.
                    Err(_) => {
                        let _ = child.kill().await;
                    }
                }
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                let _ = child.kill().await;
            }
        }

        if buf.is_empty() {
            return Err(Error::BackendTimeout {
                backend: name.to_string(),
                timeout: window,
            });
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn spawn_error(name: &str, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::unavailable(name, "not found"),
        ErrorKind::PermissionDenied => Error::unavailable(name, "permission denied"),
        _ => Error::Io(e),
    }
}
