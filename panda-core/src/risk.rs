//! Heuristic risk scoring
//!
//! Every applicable rule adds its points independently; the sum is clamped
//! to `[MIN_RISK, MAX_RISK]`. Scores are always computed from the current
//! attributes of a record and never carried across cycles.

use serde::{Deserialize, Serialize};

use crate::{is_hidden_label, DeviceRecord, MAX_RISK, MIN_RISK};

/// Capability tokens that mean some form of link protection is present
const PROTECTION_TOKENS: &[&str] = &["WPA", "RSN", "WEP", "SAE", "OWE", "EAP", "PSK"];

/// Openness flags parsed from a free-form security descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityProfile {
    /// No encryption at all
    pub open: bool,
    /// Legacy WEP encryption
    pub wep: bool,
    /// WiFi Protected Setup advertised
    pub wps: bool,
}

impl SecurityProfile {
    /// Classify a descriptor such as `[WPA2-PSK-CCMP][WPS][ESS]` or `[OPEN]`
    pub fn parse(descriptor: &str) -> Self {
        let upper = descriptor.to_ascii_uppercase();
        let protected = PROTECTION_TOKENS.iter().any(|t| upper.contains(t));

        // Android reports open networks as a bare "[ESS]"
        let open = upper.contains("OPEN") || (upper.contains("[ESS]") && !protected);

        Self {
            open,
            wep: upper.contains("WEP"),
            wps: upper.contains("WPS"),
        }
    }

    /// Open or WEP: traffic is readable by anyone in range
    pub fn is_weak(&self) -> bool {
        self.open || self.wep
    }
}

/// Attributes the scorer looks at
#[derive(Debug, Clone, Copy)]
pub struct RiskFactors<'a> {
    pub security_descriptor: &'a str,
    pub distance_m: f64,
    pub label: &'a str,
}

impl<'a> From<&'a DeviceRecord> for RiskFactors<'a> {
    fn from(record: &'a DeviceRecord) -> Self {
        Self {
            security_descriptor: &record.security_descriptor,
            distance_m: record.distance_m,
            label: &record.label,
        }
    }
}

/// Points awarded per rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Open network or WEP
    pub weak_security: u32,
    /// WPS enabled
    pub wps: u32,
    /// Closer than 5 m
    pub near: u32,
    /// Closer than 2 m (stacks with `near`)
    pub very_near: u32,
    /// Network hides its name
    pub hidden: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            weak_security: 40,
            wps: 10,
            near: 10,
            very_near: 20,
            hidden: 15,
        }
    }
}

impl RiskWeights {
    /// Distance below which `near` applies (meters)
    pub const NEAR_M: f64 = 5.0;

    /// Distance below which `very_near` also applies (meters)
    pub const VERY_NEAR_M: f64 = 2.0;

    /// Score a set of attributes, clamped to `[0, 100]`
    pub fn score(&self, factors: RiskFactors<'_>) -> u8 {
        let security = SecurityProfile::parse(factors.security_descriptor);
        let mut total: u32 = 0;

        if security.is_weak() {
            total += self.weak_security;
        }
        if security.wps {
            total += self.wps;
        }
        if factors.distance_m < Self::NEAR_M {
            total += self.near;
        }
        if factors.distance_m < Self::VERY_NEAR_M {
            total += self.very_near;
        }
        if is_hidden_label(factors.label) {
            total += self.hidden;
        }

        total.clamp(MIN_RISK as u32, MAX_RISK as u32) as u8
    }
}

/// Score with the default weights
pub fn score_risk(factors: RiskFactors<'_>) -> u8 {
    RiskWeights::default().score(factors)
}

/// Visual tier used by the radar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_score(score: u8) -> Self {
        if score > 50 {
            RiskTier::High
        } else if score > 20 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}
