//! Fusion registry - persistent per-device records built from observations
//!
//! Every scan cycle the registry:
//! - Upserts one record per hardware address (latest values win)
//! - Re-derives distance, channel and risk from the merged attributes
//! - Stamps `last_seen` on every touched record
//! - Evicts records not seen within the decay window
//!
//! [`DeviceTable`] is the single-threaded store. [`Registry`] wraps it in a
//! lock so that one writer and any number of readers can share it; a merge
//! is a single exclusive critical section, so readers never see a table
//! with some keys updated and the decay sweep still pending.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    channel_for_frequency, normalize_hardware_id, stable_angle, Observation, ObservationKind,
    PathLossModel, RiskFactors, RiskWeights, DEFAULT_DECAY_WINDOW_SECS,
};

/// A fused, persistent view of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "type")]
    pub kind: ObservationKind,

    pub label: String,

    /// Fusion key, unique within the registry
    pub hardware_id: String,

    /// Latest signal strength (dBm)
    pub signal_strength: i32,

    #[serde(rename = "frequency")]
    pub frequency_mhz: u32,

    /// Derived from frequency, 0 when unknown
    pub channel: u16,

    /// Estimated distance in meters, never below 0.1
    #[serde(rename = "distance")]
    pub distance_m: f64,

    pub security_descriptor: String,

    /// Heuristic score in `[0, 100]`
    pub risk_score: u8,

    /// When the source captured the latest observation
    pub observed_at: DateTime<Utc>,

    /// When the registry last merged an observation for this key
    pub last_seen: DateTime<Utc>,

    /// Radar bearing, a pure function of `hardware_id`
    pub angle_deg: f64,
}

impl DeviceRecord {
    fn from_observation(obs: &Observation, key: String, model: &PathLossModel, now: DateTime<Utc>) -> Self {
        let angle_deg = stable_angle(&key);
        let mut record = Self {
            kind: obs.kind,
            label: String::new(),
            hardware_id: key,
            signal_strength: 0,
            frequency_mhz: 0,
            channel: 0,
            distance_m: 0.0,
            security_descriptor: String::new(),
            risk_score: 0,
            observed_at: obs.observed_at,
            last_seen: now,
            angle_deg,
        };
        record.absorb(obs, model, now);
        record
    }

    /// Overwrite every attribute except the key from a newer observation
    fn absorb(&mut self, obs: &Observation, model: &PathLossModel, now: DateTime<Utc>) {
        self.kind = obs.kind;
        self.label = obs.label.clone();
        self.signal_strength = obs.signal_strength;
        self.frequency_mhz = obs.frequency_mhz;
        self.channel = channel_for_frequency(obs.frequency_mhz);
        self.distance_m = model.estimate(obs.signal_strength, obs.frequency_mhz);
        self.security_descriptor = obs.security_descriptor.clone();
        self.observed_at = obs.observed_at;
        self.last_seen = now;
    }

    /// Seconds since this record was last merged
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_seen).num_milliseconds() as f64 / 1000.0
    }

    /// Highest risk first, then nearest, then by key
    pub fn threat_order(a: &DeviceRecord, b: &DeviceRecord) -> Ordering {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.distance_m.total_cmp(&b.distance_m))
            .then_with(|| a.hardware_id.cmp(&b.hardware_id))
    }
}

/// A consistent view of the registry at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub devices: Vec<DeviceRecord>,
}

impl Snapshot {
    /// Devices ordered by [`DeviceRecord::threat_order`]
    pub fn sorted_by_threat(mut self) -> Self {
        self.devices.sort_by(DeviceRecord::threat_order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Models and limits applied during a merge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionPolicy {
    pub model: PathLossModel,
    pub weights: RiskWeights,
    pub decay_window: Duration,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            model: PathLossModel::default(),
            weights: RiskWeights::default(),
            decay_window: Duration::seconds(DEFAULT_DECAY_WINDOW_SECS),
        }
    }
}

/// Result of a merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Registry contents after the merge and sweep
    pub snapshot: Snapshot,
    /// Distinct keys touched by this batch
    pub touched: usize,
    /// Records removed by the decay sweep
    pub evicted: usize,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub devices: usize,
    pub wifi: usize,
    pub ble: usize,
    pub lan_nodes: usize,
    pub max_risk: u8,
}

/// Single-threaded device store
#[derive(Debug, Clone)]
pub struct DeviceTable {
    records: HashMap<String, DeviceRecord>,
    policy: FusionPolicy,
    updated_at: Option<DateTime<Utc>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::with_policy(FusionPolicy::default())
    }

    pub fn with_policy(policy: FusionPolicy) -> Self {
        Self {
            records: HashMap::new(),
            policy,
            updated_at: None,
        }
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    /// Fold a batch of observations into the table and sweep stale records.
    ///
    /// An empty batch is valid and still performs the sweep.
    pub fn merge(&mut self, observations: &[Observation], now: DateTime<Utc>) -> MergeOutcome {
        let mut touched: Vec<String> = Vec::with_capacity(observations.len());

        for obs in observations {
            let key = normalize_hardware_id(&obs.hardware_id);

            match self.records.get_mut(&key) {
                Some(existing) => existing.absorb(obs, &self.policy.model, now),
                None => {
                    let record = DeviceRecord::from_observation(obs, key.clone(), &self.policy.model, now);
                    self.records.insert(key.clone(), record);
                }
            }

            if !touched.contains(&key) {
                touched.push(key);
            }
        }

        // Risk is re-derived once every touched record holds its final attributes
        for key in &touched {
            if let Some(record) = self.records.get_mut(key) {
                let score = self.policy.weights.score(RiskFactors::from(&*record));
                record.risk_score = score;
            }
        }

        let evicted = self.sweep(now);
        self.updated_at = Some(now);

        MergeOutcome {
            snapshot: self.snapshot(),
            touched: touched.len(),
            evicted,
        }
    }

    /// Drop every record unseen for longer than the decay window
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.policy.decay_window;
        let before = self.records.len();
        self.records.retain(|_, record| now - record.last_seen <= window);
        before - self.records.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            timestamp: self.updated_at.unwrap_or_else(Utc::now),
            devices: self.records.values().cloned().collect(),
        }
    }

    pub fn get(&self, hardware_id: &str) -> Option<&DeviceRecord> {
        self.records.get(&normalize_hardware_id(hardware_id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            devices: self.records.len(),
            ..Default::default()
        };

        for record in self.records.values() {
            match record.kind {
                ObservationKind::Wifi => stats.wifi += 1,
                ObservationKind::Ble => stats.ble += 1,
                ObservationKind::LanNode => stats.lan_nodes += 1,
            }
            stats.max_risk = stats.max_risk.max(record.risk_score);
        }

        stats
    }

    /// Clear all records (for testing)
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a [`DeviceTable`], cheap to clone
#[derive(Debug, Clone, Default)]
pub struct Registry {
    table: Arc<RwLock<DeviceTable>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FusionPolicy) -> Self {
        Self {
            table: Arc::new(RwLock::new(DeviceTable::with_policy(policy))),
        }
    }

    /// Merge a batch and return the resulting device list
    pub fn merge(&self, observations: &[Observation], now: DateTime<Utc>) -> Vec<DeviceRecord> {
        self.merge_detailed(observations, now).snapshot.devices
    }

    /// Merge a batch under the write lock; upsert and sweep are one critical section
    pub fn merge_detailed(&self, observations: &[Observation], now: DateTime<Utc>) -> MergeOutcome {
        self.table.write().merge(observations, now)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.table.read().snapshot()
    }

    pub fn get(&self, hardware_id: &str) -> Option<DeviceRecord> {
        self.table.read().get(hardware_id).cloned()
    }

    pub fn stats(&self) -> RegistryStats {
        self.table.read().stats()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}
