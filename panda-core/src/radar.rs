//! Radar projection - device records onto a fixed character grid
//!
//! Distance maps to radius (saturating at the edge), the bearing is a stable
//! hash of the hardware address so a device keeps its place on screen while
//! only its signal strength changes. The center cell is reserved for the
//! observer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DeviceRecord, RiskTier};

/// Deterministic bearing in whole degrees `[0, 360)` for a hardware address.
///
/// Uses the first 8 bytes of SHA-256 over the address, read big-endian,
/// modulo 360. The hash is pinned so layouts are reproducible everywhere.
pub fn stable_angle(hardware_id: &str) -> f64 {
    let digest = Sha256::digest(hardware_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 360) as f64
}

/// Canvas geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarCanvas {
    /// Columns
    pub width: u16,
    /// Rows
    pub height: u16,
    /// Radius (in rows) at which distances saturate
    pub max_radius: f64,
    /// Distance shown at `max_radius`
    pub max_distance_m: f64,
    /// Horizontal stretch; terminal cells are about twice as tall as wide
    pub x_scale: f64,
    pub y_scale: f64,
    /// Radii of the range rings
    pub rings: Vec<f64>,
}

impl Default for RadarCanvas {
    fn default() -> Self {
        Self {
            width: 40,
            height: 15,
            max_radius: 9.0,
            max_distance_m: 20.0,
            x_scale: 2.0,
            y_scale: 1.0,
            rings: vec![3.0, 6.0, 9.0],
        }
    }
}

/// Where a device lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub cell_x: i32,
    pub cell_y: i32,
    pub tier: RiskTier,
}

impl RadarCanvas {
    pub fn center(&self) -> (i32, i32) {
        (i32::from(self.width / 2), i32::from(self.height / 2))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < i32::from(self.width) && y < i32::from(self.height)
    }

    /// Canvas radius for a distance; beyond `max_distance_m` it saturates
    pub fn radius_for(&self, distance_m: f64) -> f64 {
        (distance_m / self.max_distance_m * self.max_radius).min(self.max_radius)
    }

    /// Axis scales shrunk so that `max_radius` reaches the nearest edge and no further
    pub fn fitted_scales(&self) -> (f64, f64) {
        let (cx, cy) = self.center();
        let half_w = cx.min(i32::from(self.width) - 1 - cx).max(0) as f64;
        let half_h = cy.min(i32::from(self.height) - 1 - cy).max(0) as f64;
        (
            self.x_scale.min(half_w / self.max_radius),
            self.y_scale.min(half_h / self.max_radius),
        )
    }

    /// Cell for a radius and bearing; radii up to `max_radius` stay on the canvas
    pub fn cell_at(&self, radius: f64, angle_deg: f64) -> (i32, i32) {
        let (cx, cy) = self.center();
        let (sx, sy) = self.fitted_scales();
        let rad = angle_deg.to_radians();
        let x = cx as f64 + radius * sx * rad.cos();
        let y = cy as f64 + radius * sy * rad.sin();
        (x.round() as i32, y.round() as i32)
    }

    pub fn project(&self, record: &DeviceRecord) -> Projection {
        let (cell_x, cell_y) = self.cell_at(self.radius_for(record.distance_m), record.angle_deg);
        Projection {
            cell_x,
            cell_y,
            tier: RiskTier::from_score(record.risk_score),
        }
    }
}

/// Content of one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Ring,
    /// The observer
    Origin,
    Device(RiskTier),
}

/// Rasterized radar, row-major
#[derive(Debug, Clone)]
pub struct RadarGrid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    /// Devices that fell off the canvas
    pub dropped: usize,
}

impl RadarGrid {
    /// Draw rings, plot every device, then place the observer at the center
    pub fn plot(canvas: &RadarCanvas, devices: &[DeviceRecord]) -> Self {
        let mut grid = Self {
            width: canvas.width as usize,
            height: canvas.height as usize,
            cells: vec![Cell::Empty; canvas.width as usize * canvas.height as usize],
            dropped: 0,
        };

        for &ring in &canvas.rings {
            for step in 0..36 {
                let (x, y) = canvas.cell_at(ring, (step * 10) as f64);
                if canvas.contains(x, y) {
                    grid.set(x, y, Cell::Ring);
                }
            }
        }

        let center = canvas.center();
        for record in devices {
            let p = canvas.project(record);
            if !canvas.contains(p.cell_x, p.cell_y) {
                grid.dropped += 1;
                continue;
            }
            if (p.cell_x, p.cell_y) == center {
                continue;
            }
            // Colliding devices keep the most severe tier
            match grid.get(p.cell_x, p.cell_y) {
                Some(Cell::Device(existing)) if existing >= p.tier => {}
                _ => grid.set(p.cell_x, p.cell_y, Cell::Device(p.tier)),
            }
        }

        if canvas.contains(center.0, center.1) {
            grid.set(center.0, center.1, Cell::Origin);
        }

        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        self.cells.get(y as usize * self.width + x as usize).copied()
    }

    fn set(&mut self, x: i32, y: i32, cell: Cell) {
        let idx = y as usize * self.width + x as usize;
        self.cells[idx] = cell;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width.max(1))
    }

    /// Number of cells holding a device
    pub fn device_cells(&self) -> usize {
        self.cells.iter().filter(|c| matches!(c, Cell::Device(_))).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceTable, Observation, ObservationKind};
    use chrono::Utc;

    fn record(id: &str, rssi: i32, security: &str) -> DeviceRecord {
        let mut table = DeviceTable::new();
        let obs = Observation::builder(ObservationKind::Wifi, id)
            .label("Net")
            .signal_strength(rssi)
            .frequency_mhz(2437)
            .security(security)
            .build();
        table.merge(&[obs], Utc::now());
        table.get(id).cloned().unwrap()
    }

    #[test]
    fn test_stable_angle_is_deterministic_and_bounded() {
        for id in ["AA:BB", "00:11:22:33:44:55", "", "FF:FF:FF:FF:FF:FF"] {
            let a = stable_angle(id);
            assert_eq!(a, stable_angle(id));
            assert!((0.0..360.0).contains(&a));
            assert_eq!(a.fract(), 0.0);
        }
    }

    #[test]
    fn test_stable_angle_spreads_addresses() {
        let distinct: std::collections::HashSet<u64> = (0..200)
            .map(|i| stable_angle(&format!("02:00:00:00:{:02X}:{:02X}", i / 256, i % 256)) as u64)
            .collect();
        assert!(distinct.len() > 100);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let canvas = RadarCanvas::default();
        let device = record("AA:BB:CC:DD:EE:01", -50, "[WPA2-PSK-CCMP][ESS]");
        assert_eq!(canvas.project(&device), canvas.project(&device));
    }

    #[test]
    fn test_radius_saturates() {
        let canvas = RadarCanvas::default();
        assert_eq!(canvas.radius_for(10.0), 4.5);
        assert_eq!(canvas.radius_for(20.0), 9.0);
        assert_eq!(canvas.radius_for(500.0), 9.0);
    }

    #[test]
    fn test_cell_at_cardinal_bearings() {
        let canvas = RadarCanvas::default();
        assert_eq!(canvas.center(), (20, 7));
        assert_eq!(canvas.cell_at(0.0, 123.0), (20, 7));
        assert_eq!(canvas.cell_at(3.0, 0.0), (26, 7));
        assert_eq!(canvas.cell_at(3.0, 180.0), (14, 7));
    }

    #[test]
    fn test_tier_follows_score() {
        let canvas = RadarCanvas::default();
        assert_eq!(canvas.project(&record("A1", -35, "OPEN")).tier, RiskTier::High);
        assert_eq!(canvas.project(&record("A2", -70, "OPEN")).tier, RiskTier::Medium);
        assert_eq!(canvas.project(&record("A3", -70, "[WPA2][ESS]")).tier, RiskTier::Low);
    }

    #[test]
    fn test_center_is_reserved() {
        let canvas = RadarCanvas::default();
        // 0.1 m lands on the center cell whatever the bearing
        let co_located = record("NEXT-TO-ME", -10, "OPEN");
        assert_eq!(co_located.distance_m, 0.1);

        let grid = RadarGrid::plot(&canvas, &[co_located]);
        assert_eq!(grid.get(20, 7), Some(Cell::Origin));
        assert_eq!(grid.device_cells(), 0);
    }

    #[test]
    fn test_saturated_devices_stay_on_default_canvas() {
        let canvas = RadarCanvas::default();
        let far = record("FAR-AWAY", -75, "[WPA2][ESS]");
        assert!(far.distance_m > canvas.max_distance_m);

        let devices: Vec<DeviceRecord> = (0..360)
            .map(|angle| DeviceRecord {
                hardware_id: format!("FAR-{}", angle),
                angle_deg: angle as f64,
                ..far.clone()
            })
            .collect();

        for device in &devices {
            let p = canvas.project(device);
            assert!(canvas.contains(p.cell_x, p.cell_y), "{} -> {:?}", device.angle_deg, p);
        }
        let grid = RadarGrid::plot(&canvas, &devices);
        assert_eq!(grid.dropped, 0);
        assert!(grid.device_cells() > 0);
    }

    #[test]
    fn test_small_canvas_saturates_at_edge() {
        let canvas = RadarCanvas {
            width: 5,
            height: 5,
            max_radius: 10.0,
            rings: vec![],
            ..Default::default()
        };
        let mut far = record("FAR-AWAY", -100, "[WPA2][ESS]");
        far.angle_deg = 90.0;

        assert_eq!(canvas.project(&far).cell_y, 4);
        let grid = RadarGrid::plot(&canvas, &[far]);
        assert_eq!(grid.dropped, 0);
        assert_eq!(grid.device_cells(), 1);
        assert_eq!(grid.rows().count(), 5);
    }

    #[test]
    fn test_degenerate_canvas_drops_nothing_off_grid() {
        let canvas = RadarCanvas {
            width: 1,
            height: 1,
            rings: vec![],
            ..Default::default()
        };
        let grid = RadarGrid::plot(&canvas, &[record("ANY", -60, "WPA2")]);
        assert_eq!(grid.get(0, 0), Some(Cell::Origin));
        assert_eq!(grid.dropped, 0);
    }

    #[test]
    fn test_collision_keeps_highest_tier() {
        let canvas = RadarCanvas::default();
        let mut low = record("SAME", -70, "[WPA2][ESS]");
        let mut high = low.clone();
        high.risk_score = 90;
        low.risk_score = 0;

        let grid = RadarGrid::plot(&canvas, &[high.clone(), low.clone()]);
        let p = canvas.project(&high);
        assert_eq!(grid.get(p.cell_x, p.cell_y), Some(Cell::Device(RiskTier::High)));

        let grid = RadarGrid::plot(&canvas, &[low, high]);
        assert_eq!(grid.get(p.cell_x, p.cell_y), Some(Cell::Device(RiskTier::High)));
    }
}
