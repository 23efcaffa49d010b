#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and focus range tables for the autofocus rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The focus range CSV maps zoom levels to the lens positions worth
//!   sweeping at that zoom; `RangeTable::hint_for_zoom` turns it into a
//!   coarse-scan window.
use serde::Deserialize;

/// Focus range CSV schema.
///
/// Expected headers:
/// zoom,start,end
///
/// Example:
/// zoom,start,end
/// 0,0,1100
/// 100,150,1050
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RangeRow {
    pub zoom: u32,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Deserialize)]
pub struct FocuserCfg {
    /// Lowest focus setpoint accepted by the actuator.
    #[serde(default)]
    pub min_focus: i32,
    /// Highest focus setpoint accepted by the actuator.
    pub max_focus: i32,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    /// 7-bit address of the lens controller.
    #[serde(default = "default_i2c_addr")]
    pub i2c_addr: u16,
}

fn default_i2c_bus() -> u8 {
    1
}

fn default_i2c_addr() -> u16 {
    0x0C
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    LaplacianVariance,
    Tenengrad,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RoiRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SharpnessCfg {
    pub metric: Metric,
    /// Central crop fraction in (0.0, 1.0]; 1.0 scores the whole frame.
    pub roi_fraction: f32,
    /// Explicit ROI in pixels; takes precedence over `roi_fraction`.
    pub roi: Option<RoiRect>,
    pub blur_sigma: f32,
    pub edge_floor: f32,
}

impl Default for SharpnessCfg {
    fn default() -> Self {
        Self {
            metric: Metric::LaplacianVariance,
            roi_fraction: 0.5,
            roi: None,
            blur_sigma: 0.0,
            edge_floor: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    pub median_window: usize,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self { median_window: 3 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FineWindow {
    #[default]
    Centered,
    Below,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanCfg {
    pub coarse_step: i32,
    pub fine_step: i32,
    /// Half-width of the fine window; defaults to `coarse_step`.
    pub fine_margin: Option<i32>,
    pub fine_window: FineWindow,
    /// Frames ignored after every lens move.
    pub settle_frames: u32,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            coarse_step: 80,
            fine_step: 10,
            fine_margin: None,
            fine_window: FineWindow::Centered,
            settle_frames: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApproachDirection {
    #[default]
    FromBelow,
    FromAbove,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BacklashCfg {
    pub enabled: bool,
    pub direction: ApproachDirection,
    pub overshoot: i32,
    pub settle_frames: u32,
}

impl Default for BacklashCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: ApproachDirection::FromBelow,
            overshoot: 30,
            settle_frames: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConfidenceCfg {
    pub min_score: f64,
}

impl Default for ConfidenceCfg {
    fn default() -> Self {
        Self { min_score: 5.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraCfg {
    pub fps: u32,
    /// Max wait for one frame before the source reports "no frame".
    pub frame_timeout_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            fps: 30,
            frame_timeout_ms: 200,
            width: 320,
            height: 240,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Hard cap for one autofocus session.
    pub max_run_ms: u64,
}

impl Default for Safety {
    fn default() -> Self {
        Self { max_run_ms: 30_000 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Pump,
    Direct,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RunnerCfg {
    /// Default orchestration mode: "pump" (frame thread) or "direct"
    pub mode: RunMode,
}

/// Parameters of the simulated rig used when no lens hardware is attached.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    /// Lens position at which the synthetic scene is in focus.
    pub peak: i32,
    /// Defocus distance at which texture contrast has halved.
    pub depth_of_field: f64,
    /// Frames before a commanded move is visible.
    pub latency_frames: u32,
    /// Slack left when the lens is driven downwards.
    pub backlash: i32,
    /// Peak amplitude of per-pixel sensor noise.
    pub noise: u8,
    pub seed: u32,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            peak: 643,
            depth_of_field: 60.0,
            latency_frames: 1,
            backlash: 0,
            noise: 2,
            seed: 0x5EED_F0C5,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub focuser: FocuserCfg,
    #[serde(default)]
    pub sharpness: SharpnessCfg,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub scan: ScanCfg,
    #[serde(default)]
    pub backlash: BacklashCfg,
    #[serde(default)]
    pub confidence: ConfidenceCfg,
    #[serde(default)]
    pub camera: CameraCfg,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub logging: Logging,
    /// Runner/orchestration defaults
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Zoom-keyed focus ranges, sorted by strictly increasing zoom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTable {
    rows: Vec<RangeRow>,
}

impl RangeTable {
    pub fn from_rows(rows: Vec<RangeRow>) -> eyre::Result<Self> {
        if rows.is_empty() {
            eyre::bail!("focus range table requires at least one row");
        }
        for (i, row) in rows.iter().enumerate() {
            if row.start > row.end {
                eyre::bail!(
                    "focus range row {} (zoom {}) has start {} > end {}",
                    i,
                    row.zoom,
                    row.start,
                    row.end
                );
            }
            if row.start < 0 {
                eyre::bail!("focus range row {} (zoom {}) has negative start", i, row.zoom);
            }
        }
        for i in 1..rows.len() {
            if rows[i].zoom <= rows[i - 1].zoom {
                eyre::bail!(
                    "focus range zoom values must be strictly increasing (index {} and {})",
                    i - 1,
                    i
                );
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[RangeRow] {
        &self.rows
    }

    /// Coarse-scan window for zoom level `zoom`.
    ///
    /// `start` comes from the first row at or above `zoom` and `end` from the
    /// last row at or below it, so between two rows the window is the union of
    /// both. Outside the table the nearest edge row is used. The result can be
    /// inverted for oddly shaped tables; the controller rejects those.
    pub fn hint_for_zoom(&self, zoom: u32) -> (i32, i32) {
        let first = self.rows[0];
        let last = self.rows[self.rows.len() - 1];
        let start = self
            .rows
            .iter()
            .find(|r| r.zoom >= zoom)
            .map_or(last.start, |r| r.start);
        let end = self
            .rows
            .iter()
            .rev()
            .find(|r| r.zoom <= zoom)
            .map_or(first.end, |r| r.end);
        (start, end)
    }
}

impl TryFrom<Vec<RangeRow>> for RangeTable {
    type Error = eyre::Report;
    fn try_from(rows: Vec<RangeRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_range_csv(path: &std::path::Path) -> eyre::Result<RangeTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open focus range CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["zoom", "start", "end"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "focus range CSV must have headers 'zoom,start,end', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<RangeRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    RangeTable::try_from(rows)
}

impl Config {
    /// Inclusive actuator range `(min_focus, max_focus)`.
    pub fn focus_range(&self) -> (i32, i32) {
        (self.focuser.min_focus, self.focuser.max_focus)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Focuser
        if self.focuser.min_focus < 0 {
            eyre::bail!("focuser.min_focus must be >= 0");
        }
        if self.focuser.max_focus <= self.focuser.min_focus {
            eyre::bail!("focuser.max_focus must be > focuser.min_focus");
        }
        if self.focuser.i2c_addr > 0x7F {
            eyre::bail!("focuser.i2c_addr must be a 7-bit address (<= 0x7f)");
        }
        let span = self.focuser.max_focus - self.focuser.min_focus;

        // Scan
        if self.scan.coarse_step <= 0 {
            eyre::bail!("scan.coarse_step must be > 0");
        }
        if self.scan.fine_step <= 0 {
            eyre::bail!("scan.fine_step must be > 0");
        }
        if self.scan.fine_step >= self.scan.coarse_step {
            eyre::bail!("scan.fine_step must be smaller than scan.coarse_step");
        }
        if self.scan.coarse_step > span {
            eyre::bail!("scan.coarse_step must not exceed the focus range ({span})");
        }
        if let Some(margin) = self.scan.fine_margin
            && margin <= 0
        {
            eyre::bail!("scan.fine_margin must be > 0");
        }
        if self.scan.settle_frames > 120 {
            eyre::bail!("scan.settle_frames is unreasonably large (>120)");
        }

        // Filter
        if self.filter.median_window == 0 {
            eyre::bail!("filter.median_window must be >= 1");
        }
        if self.filter.median_window > 15 {
            eyre::bail!("filter.median_window must be <= 15");
        }

        // Sharpness
        let f = self.sharpness.roi_fraction;
        if !(f > 0.0 && f <= 1.0) {
            eyre::bail!("sharpness.roi_fraction must be in (0.0, 1.0]");
        }
        if let Some(roi) = self.sharpness.roi
            && (roi.width < 3 || roi.height < 3)
        {
            eyre::bail!("sharpness.roi must be at least 3x3 pixels");
        }
        if !self.sharpness.blur_sigma.is_finite() || self.sharpness.blur_sigma < 0.0 {
            eyre::bail!("sharpness.blur_sigma must be >= 0.0");
        }
        if !self.sharpness.edge_floor.is_finite() || self.sharpness.edge_floor < 0.0 {
            eyre::bail!("sharpness.edge_floor must be >= 0.0");
        }

        // Backlash
        if self.backlash.overshoot < 0 {
            eyre::bail!("backlash.overshoot must be >= 0");
        }
        if self.backlash.overshoot > span {
            eyre::bail!("backlash.overshoot must not exceed the focus range ({span})");
        }

        // Confidence
        if !self.confidence.min_score.is_finite() || self.confidence.min_score < 0.0 {
            eyre::bail!("confidence.min_score must be finite and >= 0.0");
        }

        // Camera
        if self.camera.fps == 0 || self.camera.fps > 1000 {
            eyre::bail!("camera.fps must be in [1, 1000]");
        }
        if self.camera.frame_timeout_ms == 0 {
            eyre::bail!("camera.frame_timeout_ms must be >= 1");
        }
        if self.camera.width < 3 || self.camera.height < 3 {
            eyre::bail!("camera.width and camera.height must be >= 3");
        }

        // Safety
        if self.safety.max_run_ms == 0 {
            eyre::bail!("safety.max_run_ms must be >= 1");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        if !(self.simulation.depth_of_field.is_finite() && self.simulation.depth_of_field > 0.0) {
            eyre::bail!("simulation.depth_of_field must be > 0.0");
        }
        if self.simulation.backlash < 0 {
            eyre::bail!("simulation.backlash must be >= 0");
        }

        // Runner: no extra validation; serde restricts to known modes

        Ok(())
    }
}
