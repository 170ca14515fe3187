//! Raw proximity observations produced by sensing sources
//!
//! An observation is ephemeral: it lives for one scan cycle and is folded
//! into a persistent [`DeviceRecord`](crate::DeviceRecord) by the registry.
//! The hardware address is the universal fusion key for every kind of
//! device, so it is normalized on construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used by sources when a network does not broadcast its name
pub const HIDDEN_LABEL: &str = "Hidden";

/// What kind of sensing produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationKind {
    /// WiFi access point (BSSID from a radio scan)
    Wifi,
    /// Bluetooth Low Energy advertiser
    Ble,
    /// Host seen in the LAN neighbor table
    LanNode,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Wifi => "WIFI",
            ObservationKind::Ble => "BLE",
            ObservationKind::LanNode => "LAN_NODE",
        }
    }
}

impl std::fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sighting of a device during one scan cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Sensing modality
    pub kind: ObservationKind,

    /// Display name (SSID, device name, or `host: <address>`)
    pub label: String,

    /// Hardware address, upper-cased and trimmed
    pub hardware_id: String,

    /// Signal strength in dBm (more negative = weaker)
    pub signal_strength: i32,

    /// Carrier frequency in MHz, 0 when not a radio observation
    pub frequency_mhz: u32,

    /// Free-form description of encryption / openness
    pub security_descriptor: String,

    /// Capture timestamp
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Create a new observation builder
    pub fn builder(kind: ObservationKind, hardware_id: &str) -> ObservationBuilder {
        ObservationBuilder::new(kind, hardware_id)
    }

    /// Whether the label is the explicit hidden-network marker
    pub fn is_hidden(&self) -> bool {
        is_hidden_label(&self.label)
    }
}

/// Normalize a hardware address into its fusion key form
pub fn normalize_hardware_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Whether a label marks a network that hides its name
pub fn is_hidden_label(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(HIDDEN_LABEL)
}

/// Builder for observations
pub struct ObservationBuilder {
    kind: ObservationKind,
    hardware_id: String,
    label: Option<String>,
    signal_strength: i32,
    frequency_mhz: u32,
    security_descriptor: String,
    observed_at: Option<DateTime<Utc>>,
}

impl ObservationBuilder {
    pub fn new(kind: ObservationKind, hardware_id: &str) -> Self {
        Self {
            kind,
            hardware_id: normalize_hardware_id(hardware_id),
            label: None,
            signal_strength: -100,
            frequency_mhz: 0,
            security_descriptor: String::new(),
            observed_at: None,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn signal_strength(mut self, dbm: i32) -> Self {
        self.signal_strength = dbm;
        self
    }

    pub fn frequency_mhz(mut self, mhz: u32) -> Self {
        self.frequency_mhz = mhz;
        self
    }

    pub fn security(mut self, descriptor: &str) -> Self {
        self.security_descriptor = descriptor.to_string();
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }

    pub fn build(self) -> Observation {
        // An empty name is indistinguishable from a hidden one
        let label = match self.label {
            Some(label) if !label.trim().is_empty() => label,
            _ => HIDDEN_LABEL.to_string(),
        };

        Observation {
            kind: self.kind,
            label,
            hardware_id: self.hardware_id,
            signal_strength: self.signal_strength,
            frequency_mhz: self.frequency_mhz,
            security_descriptor: self.security_descriptor,
            observed_at: self.observed_at.unwrap_or_else(Utc::now),
        }
    }
}
