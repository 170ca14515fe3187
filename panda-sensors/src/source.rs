//! Observation source contract
//!
//! A source turns one platform sensing capability into a list of
//! observations. Sources never fail from the caller's point of view: every
//! capture error, including running out of time, degrades to an empty list.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use panda_core::Observation;

/// Default budget for a single external command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while capturing observations
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to run {0}")]
    Spawn(String),

    #[error("Command failed: {0}")]
    Exit(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Malformed output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CaptureError {
    fn from(e: serde_json::Error) -> Self {
        CaptureError::Parse(e.to_string())
    }
}

/// Common interface for all sensing backends
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Perform one capture, reporting failures
    async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError>;

    /// Perform one capture within `budget`; any failure yields an empty list
    async fn capture(&self, budget: Duration) -> Vec<Observation> {
        match tokio::time::timeout(budget, self.try_capture()).await {
            Ok(Ok(observations)) => {
                debug!("Source {} captured {} observations", self.name(), observations.len());
                observations
            }
            Ok(Err(e)) => {
                warn!("Source {} failed: {}", self.name(), e);
                Vec::new()
            }
            Err(_) => {
                warn!("Source {} timed out after {} ms", self.name(), budget.as_millis());
                Vec::new()
            }
        }
    }
}

/// Run an external command and return its stdout.
///
/// The child is killed if the budget expires or the future is dropped.
pub async fn run_command(
    program: &str,
    args: &[&str],
    budget: Duration,
) -> Result<String, CaptureError> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).kill_on_drop(true);

    let output = tokio::time::timeout(budget, command.output())
        .await
        .map_err(|_| CaptureError::Timeout(budget.as_millis() as u64))?
        .map_err(|e| CaptureError::Spawn(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::Exit(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
