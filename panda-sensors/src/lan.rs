//! LAN neighbor discovery
//!
//! Where the radio is out of reach (iSH and similar sandboxes) the best
//! available proximity signal is the neighbor table of the network we are
//! joined to. Each neighbor is pinged once and its round-trip latency is
//! mapped onto a pseudo signal strength.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use panda_core::{Observation, ObservationKind};

use crate::{run_command, CaptureError, ObservationSource, DEFAULT_COMMAND_TIMEOUT};

/// Pseudo signal strength when a neighbor does not answer
pub const UNREACHABLE_SIGNAL_DBM: i32 = -80;

/// Budget for a single ping; `ping -W 1` gives up after a second anyway
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

static ARP_A_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([0-9a-fA-F.:]+)\) at ([0-9a-fA-F]{1,2}(?::[0-9a-fA-F]{1,2}){5})").unwrap()
});

static PING_TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)").unwrap()
});

/// An entry of the neighbor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub ip: String,
    pub mac: String,
}

fn is_placeholder_mac(mac: &str) -> bool {
    mac.split(':').all(|octet| octet.trim_start_matches('0').is_empty())
}

/// Parse Linux `/proc/net/arp`
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         00:11:22:33:44:55     *        eth0
/// ```
pub fn parse_proc_arp(text: &str) -> Vec<Neighbor> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            // Flags 0x0 marks an incomplete entry
            if parts[2] == "0x0" || is_placeholder_mac(parts[3]) {
                return None;
            }
            Some(Neighbor {
                ip: parts[0].to_string(),
                mac: parts[3].to_string(),
            })
        })
        .collect()
}

/// Parse BSD-style `arp -a` (`? (192.168.1.1) at 0:11:22:33:44:55 on en0 ...`)
pub fn parse_arp_a(text: &str) -> Vec<Neighbor> {
    ARP_A_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let mac = pad_mac(&caps[2]);
            if is_placeholder_mac(&mac) {
                return None;
            }
            Some(Neighbor {
                ip: caps[1].to_string(),
                mac,
            })
        })
        .collect()
}

/// BSD `arp` drops leading zeros (`0:1:2:...`); pad octets to two digits
fn pad_mac(mac: &str) -> String {
    mac.split(':')
        .map(|octet| format!("{:0>2}", octet))
        .collect::<Vec<_>>()
        .join(":")
}

/// Round-trip time in ms from `ping` output
pub fn parse_ping_latency(output: &str) -> Option<f64> {
    PING_TIME_REGEX
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

/// Map latency to a pseudo signal strength: fast answers look close
pub fn latency_to_signal(ms: f64) -> i32 {
    if ms < 2.0 {
        -40
    } else if ms > 100.0 {
        -90
    } else {
        (-40.0 - ms / 2.0) as i32
    }
}

/// Neighbor table probe
///
/// All probes of one capture share a sweep deadline. Neighbors still
/// unanswered (or not yet probed) when it passes are reported as
/// unreachable, so a capture never outlives its caller's budget.
pub struct LanNeighborSource {
    arp_path: PathBuf,
    probe_timeout: Duration,
    sweep_budget: Duration,
    max_concurrent_probes: usize,
}

impl LanNeighborSource {
    pub fn new(arp_path: impl Into<PathBuf>, probe_timeout: Duration, max_concurrent_probes: usize) -> Self {
        Self {
            arp_path: arp_path.into(),
            probe_timeout,
            sweep_budget: DEFAULT_COMMAND_TIMEOUT * 3 / 4,
            max_concurrent_probes: max_concurrent_probes.max(1),
        }
    }

    /// Fit the whole capture into `budget`, leaving a quarter for reading the table
    pub fn for_budget(budget: Duration) -> Self {
        let sweep = budget * 3 / 4;
        Self::new("/proc/net/arp", DEFAULT_PROBE_TIMEOUT.min(sweep), 8).with_sweep_budget(sweep)
    }

    pub fn with_sweep_budget(mut self, sweep_budget: Duration) -> Self {
        self.sweep_budget = sweep_budget;
        self
    }

    async fn neighbors(&self) -> Result<Vec<Neighbor>, CaptureError> {
        match tokio::fs::read_to_string(&self.arp_path).await {
            Ok(text) => Ok(parse_proc_arp(&text)),
            Err(e) => {
                debug!("{} unreadable ({}), falling back to arp -a", self.arp_path.display(), e);
                let output = run_command("arp", &["-a"], self.probe_timeout).await?;
                Ok(parse_arp_a(&output))
            }
        }
    }

    async fn probe(ip: &str, budget: Duration) -> i32 {
        match run_command("ping", &["-c", "1", "-W", "1", ip], budget).await {
            Ok(output) => parse_ping_latency(&output)
                .map(latency_to_signal)
                .unwrap_or(UNREACHABLE_SIGNAL_DBM),
            Err(e) => {
                debug!("Ping {} failed: {}", ip, e);
                UNREACHABLE_SIGNAL_DBM
            }
        }
    }
}

impl Default for LanNeighborSource {
    fn default() -> Self {
        Self::for_budget(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl ObservationSource for LanNeighborSource {
    fn name(&self) -> &str {
        "lan-neighbors"
    }

    async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
        let neighbors = self.neighbors().await?;
        let budget = self.probe_timeout;
        let deadline = Instant::now() + self.sweep_budget;

        let observations: Vec<Observation> = stream::iter(neighbors)
            .map(|neighbor| async move {
                let signal = timeout_at(deadline, Self::probe(&neighbor.ip, budget))
                    .await
                    .unwrap_or(UNREACHABLE_SIGNAL_DBM);
                Observation::builder(ObservationKind::LanNode, &neighbor.mac)
                    .label(&format!("host: {}", neighbor.ip))
                    .signal_strength(signal)
                    .frequency_mhz(0)
                    .security("CONNECTED")
                    .observed_at(Utc::now())
                    .build()
            })
            .buffer_unordered(self.max_concurrent_probes)
            .collect()
            .await;

        Ok(observations)
    }
}
