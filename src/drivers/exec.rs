//! External process execution
//!
//! Thin wrapper over `tokio::process` that captures stdout and folds a
//! nonzero exit into an error carrying stderr.

use async_trait::async_trait;
use tracing::debug;

use super::CommandRunner;
use crate::error::{Error, Result};

/// Runs real processes on the host
#[derive(Debug, Default)]
pub struct OsCommandRunner;

impl OsCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for OsCommandRunner {
    async fn run(&self, cmd: &str, args: &[&str]) -> Result<String> {
        debug!("running {} {:?}", cmd, args);
        let output = tokio::process::Command::new(cmd)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Command(format!("{cmd}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Command(format!(
                "{cmd} exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
