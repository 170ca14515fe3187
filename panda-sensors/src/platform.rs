//! Host platform detection and source selection
//!
//! Which sources run is decided once at startup, either from an explicit
//! list or from the capabilities the detected platform is known to offer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{LanNeighborSource, MockSource, ObservationSource, TermuxBleSource, TermuxWifiSource};

/// Host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Android with Termux:API, radio scans available
    Termux,
    /// iSH on iOS, no radio access
    Ish,
    /// Anything else
    Generic,
}

const TERMUX_MARKERS: &[&str] = &["data/data/com.termux"];
const ISH_MARKERS: &[&str] = &["dev/ish", "proc/ish", "etc/alpine-release"];

impl Platform {
    /// Probe the running host
    pub fn detect() -> Self {
        Self::detect_in(Path::new("/"))
    }

    /// Probe marker paths below `root`
    pub fn detect_in(root: &Path) -> Self {
        if any_present(root, TERMUX_MARKERS) {
            Platform::Termux
        } else if any_present(root, ISH_MARKERS) {
            Platform::Ish
        } else {
            Platform::Generic
        }
    }

    /// Sources this platform can run
    pub fn default_sources(&self) -> Vec<SourceKind> {
        match self {
            Platform::Termux => vec![SourceKind::TermuxWifi, SourceKind::TermuxBle],
            Platform::Ish => vec![SourceKind::LanNeighbors],
            Platform::Generic => vec![SourceKind::Mock],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Termux => "termux",
            Platform::Ish => "ish",
            Platform::Generic => "generic",
        }
    }
}

fn any_present(root: &Path, markers: &[&str]) -> bool {
    markers.iter().any(|m| root.join(m).exists())
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "termux" => Ok(Platform::Termux),
            "ish" => Ok(Platform::Ish),
            "generic" => Ok(Platform::Generic),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Available observation source implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TermuxWifi,
    TermuxBle,
    LanNeighbors,
    Mock,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TermuxWifi => "termux_wifi",
            SourceKind::TermuxBle => "termux_ble",
            SourceKind::LanNeighbors => "lan_neighbors",
            SourceKind::Mock => "mock",
        }
    }

    /// Instantiate the source for captures bounded by `budget`
    pub fn build(&self, budget: Duration) -> Box<dyn ObservationSource> {
        match self {
            SourceKind::TermuxWifi => Box::new(TermuxWifiSource::default()),
            SourceKind::TermuxBle => Box::new(TermuxBleSource::default()),
            SourceKind::LanNeighbors => Box::new(LanNeighborSource::for_budget(budget)),
            SourceKind::Mock => Box::new(MockSource::default()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "termux_wifi" | "wifi" => Ok(SourceKind::TermuxWifi),
            "termux_ble" | "ble" => Ok(SourceKind::TermuxBle),
            "lan_neighbors" | "lan" | "arp" => Ok(SourceKind::LanNeighbors),
            "mock" => Ok(SourceKind::Mock),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// Build the active source set: the explicit list if any, else the platform default
pub fn select_sources(
    platform: Platform,
    explicit: Option<&[SourceKind]>,
    budget: Duration,
) -> Vec<Box<dyn ObservationSource>> {
    let kinds = match explicit {
        Some(kinds) if !kinds.is_empty() => kinds.to_vec(),
        _ => platform.default_sources(),
    };

    let mut seen = Vec::new();
    kinds
        .into_iter()
        .filter(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        })
        .map(|kind| kind.build(budget))
        .collect()
}
