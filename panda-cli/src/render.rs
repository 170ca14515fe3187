//! Terminal radar rendering

use std::fmt::Write;

use panda_core::{Cell, RadarCanvas, RadarGrid, RiskTier, Snapshot};
use panda_sensors::{Location, Platform};

/// ANSI clear screen and home cursor
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Rows shown in the device table
pub const TABLE_ROWS: usize = 15;

const LABEL_WIDTH: usize = 20;

fn cell_char(cell: Cell) -> char {
    match cell {
        Cell::Empty => ' ',
        Cell::Ring => '.',
        Cell::Origin => 'X',
        Cell::Device(RiskTier::Low) => '●',
        Cell::Device(RiskTier::Medium) => '◆',
        Cell::Device(RiskTier::High) => '▲',
    }
}

fn truncate(label: &str, max: usize) -> String {
    label.chars().take(max).collect()
}

/// Draw the radar grid as text, one line per row
pub fn render_radar(grid: &RadarGrid) -> String {
    let mut out = String::with_capacity((grid.width() * 3 + 1) * grid.height());
    for row in grid.rows() {
        out.extend(row.iter().map(|&c| cell_char(c)));
        out.push('\n');
    }
    out
}

/// Full screen: header, radar, top devices by threat
pub fn render_frame(platform: Platform, location: &Location, canvas: &RadarCanvas, snapshot: Snapshot) -> String {
    let snapshot = snapshot.sorted_by_threat();
    let grid = RadarGrid::plot(canvas, &snapshot.devices);

    let mut out = String::from(CLEAR);
    let _ = writeln!(out, "🐼 PANDA | {} | {}", platform, snapshot.timestamp.format("%H:%M:%S"));
    let _ = writeln!(
        out,
        "📍 {:.4}, {:.4} ({}) | 📡 {} devices",
        location.lat,
        location.lon,
        location.provider,
        snapshot.devices.len()
    );
    out.push('\n');
    out.push_str(&render_radar(&grid));
    if grid.dropped > 0 {
        let _ = writeln!(out, "({} off-canvas)", grid.dropped);
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "{:>2}  {:<20}  {:<17}  {:>7}  {:>4}",
        "#", "LABEL", "HARDWARE ID", "DIST", "RISK"
    );
    for (i, device) in snapshot.devices.iter().take(TABLE_ROWS).enumerate() {
        let _ = writeln!(
            out,
            "{:>2}  {:<20}  {:<17}  {:>6.1}m  {:>3}%",
            i + 1,
            truncate(&device.label, LABEL_WIDTH),
            device.hardware_id,
            device.distance_m,
            device.risk_score
        );
    }

    out
}
