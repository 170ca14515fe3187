//! Configuration
//!
//! Loaded from an optional TOML file; every section and field has a
//! default, so an empty file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use panda_core::{
    FusionPolicy, PathLossModel, RadarCanvas, RiskWeights, DEFAULT_DECAY_WINDOW_SECS,
    DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_TX_POWER_DBM,
};
use panda_sensors::{GeoConfig, Platform, SourceKind};

use crate::LogPolicy;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Longest accepted decay window (one year)
pub const MAX_DECAY_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

/// Scan loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Time between cycle starts
    pub interval_ms: u64,
    /// Budget for each source capture
    pub source_timeout_ms: u64,
    /// 0 runs until shutdown
    pub max_runtime_secs: u64,
    /// Records unseen for longer than this are evicted
    pub decay_window_secs: i64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            source_timeout_ms: 2000,
            max_runtime_secs: 0,
            decay_window_secs: DEFAULT_DECAY_WINDOW_SECS,
        }
    }
}

/// Path loss model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub tx_power_dbm: f64,
    pub path_loss_exponent: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

/// Platform override, `auto` probes the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSetting {
    #[default]
    Auto,
    Termux,
    Ish,
    Generic,
}

impl PlatformSetting {
    pub fn resolve(&self) -> Platform {
        match self {
            PlatformSetting::Auto => Platform::detect(),
            PlatformSetting::Termux => Platform::Termux,
            PlatformSetting::Ish => Platform::Ish,
            PlatformSetting::Generic => Platform::Generic,
        }
    }
}

impl FromStr for PlatformSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(PlatformSetting::Auto);
        }
        Ok(match s.parse::<Platform>()? {
            Platform::Termux => PlatformSetting::Termux,
            Platform::Ish => PlatformSetting::Ish,
            Platform::Generic => PlatformSetting::Generic,
        })
    }
}

impl fmt::Display for PlatformSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformSetting::Auto => f.write_str("auto"),
            PlatformSetting::Termux => f.write_str("termux"),
            PlatformSetting::Ish => f.write_str("ish"),
            PlatformSetting::Generic => f.write_str("generic"),
        }
    }
}

/// Which sources to run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub platform: PlatformSetting,
    /// Overrides the platform's default source set
    pub enabled: Option<Vec<SourceKind>>,
}

/// Event log sink, disabled without a path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogSettings {
    pub path: Option<PathBuf>,
    pub policy: LogPolicy,
}

/// HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5050".to_string(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PandaConfig {
    pub scan: ScanSettings,
    pub model: ModelSettings,
    pub radar: RadarCanvas,
    pub sources: SourceSettings,
    pub event_log: EventLogSettings,
    pub server: ServerSettings,
    pub geo: GeoConfig,
}

impl PandaConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject unusable values; log the merely questionable ones
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.interval_ms == 0 {
            return Err(ConfigError::Invalid("scan.interval_ms must be positive".into()));
        }
        if self.scan.source_timeout_ms == 0 {
            return Err(ConfigError::Invalid("scan.source_timeout_ms must be positive".into()));
        }
        if !(0..=MAX_DECAY_WINDOW_SECS).contains(&self.scan.decay_window_secs) {
            return Err(ConfigError::Invalid(format!(
                "scan.decay_window_secs must be between 0 and {}",
                MAX_DECAY_WINDOW_SECS
            )));
        }
        if self.radar.width == 0 || self.radar.height == 0 {
            return Err(ConfigError::Invalid("radar dimensions must be positive".into()));
        }
        if !(self.radar.max_radius > 0.0 && self.radar.max_distance_m > 0.0) {
            return Err(ConfigError::Invalid(
                "radar.max_radius and radar.max_distance_m must be positive".into(),
            ));
        }

        for warning in self.warnings() {
            warn!("{}", warning);
        }
        Ok(())
    }

    /// Settings that work but are likely to misbehave
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let window_ms = self.scan.decay_window_secs.saturating_mul(1000);
        let min_ms = self.scan.interval_ms.saturating_mul(3);
        if window_ms <= min_ms as i64 {
            warnings.push(format!(
                "Decay window {}s is not longer than three scan intervals ({} ms); devices will flicker",
                self.scan.decay_window_secs, min_ms
            ));
        }

        if self.scan.source_timeout_ms > self.scan.interval_ms {
            warnings.push(format!(
                "Source timeout {} ms exceeds the scan interval {} ms; cycles will overrun",
                self.scan.source_timeout_ms, self.scan.interval_ms
            ));
        }

        warnings
    }

    /// Merge policy for the fusion registry
    pub fn fusion_policy(&self) -> FusionPolicy {
        FusionPolicy {
            model: PathLossModel::new(self.model.tx_power_dbm, self.model.path_loss_exponent),
            weights: RiskWeights::default(),
            decay_window: chrono::Duration::seconds(
                self.scan.decay_window_secs.clamp(0, MAX_DECAY_WINDOW_SECS),
            ),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.scan.interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.source_timeout_ms)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        (self.scan.max_runtime_secs > 0).then(|| Duration::from_secs(self.scan.max_runtime_secs))
    }
}
