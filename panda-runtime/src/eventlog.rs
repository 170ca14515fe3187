//! Append-only JSONL event log of observed devices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use panda_core::DeviceRecord;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which devices get written each cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPolicy {
    /// Every device in the registry
    #[default]
    EveryCycle,
    /// Only devices scoring at least this much
    RiskAtLeast(u8),
}

impl LogPolicy {
    pub fn admits(&self, record: &DeviceRecord) -> bool {
        match self {
            LogPolicy::EveryCycle => true,
            LogPolicy::RiskAtLeast(threshold) => record.risk_score >= *threshold,
        }
    }
}

/// One line of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub hardware_id: String,
    pub distance: f64,
    pub risk_score: u8,
}

impl LogEntry {
    fn new(record: &DeviceRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            label: record.label.clone(),
            hardware_id: record.hardware_id.clone(),
            distance: record.distance_m,
            risk_score: record.risk_score,
        }
    }
}

/// File sink, created on first write
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    policy: LogPolicy,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, policy: LogPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> LogPolicy {
        self.policy
    }

    /// Append the admitted devices, returning how many lines were written
    pub async fn append(&self, devices: &[DeviceRecord], now: DateTime<Utc>) -> Result<usize, EventLogError> {
        let mut buffer = String::new();
        let mut written = 0;

        for record in devices.iter().filter(|r| self.policy.admits(r)) {
            buffer.push_str(&serde_json::to_string(&LogEntry::new(record, now))?);
            buffer.push('\n');
            written += 1;
        }

        if written == 0 {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        Ok(written)
    }
}
