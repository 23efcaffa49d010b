//! Configuration types for the autofocus engine.
//!
//! These are the runtime configuration structs used by `AutofocusCore`.
//! They are separate from the TOML-deserialized config in `focus_config`.

/// Edge/variance metric used to score a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SharpnessMetric {
    /// Variance of the 4-neighbour Laplacian response.
    #[default]
    LaplacianVariance,
    /// Mean 3x3 Sobel gradient magnitude, with weak gradients floored to zero.
    Tenengrad,
}

/// Region of the frame that is scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Roi {
    /// Whole frame.
    Full,
    /// Centered crop covering this fraction of width and height, in (0.0, 1.0].
    Central(f32),
    /// Explicit rectangle in pixels, clipped to the frame.
    Rect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Sharpness estimation pipeline.
#[derive(Debug, Clone)]
pub struct SharpnessCfg {
    pub metric: SharpnessMetric,
    pub roi: Roi,
    /// Gaussian denoise sigma applied before the metric. 0.0 disables.
    pub blur_sigma: f32,
    /// Gradient magnitudes below this are treated as noise (Tenengrad only). 0.0 disables.
    pub edge_floor: f32,
}

impl Default for SharpnessCfg {
    fn default() -> Self {
        Self {
            metric: SharpnessMetric::LaplacianVariance,
            roi: Roi::Central(0.5),
            blur_sigma: 0.0,
            edge_floor: 0.0,
        }
    }
}

/// Score smoothing configuration.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    /// Rolling median window (1 = disabled).
    pub median_window: usize,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self { median_window: 3 }
    }
}

/// Where the fine window sits relative to the coarse best position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FineWindowPolicy {
    /// `[best - margin, best + margin]`.
    #[default]
    Centered,
    /// `[best - margin, best]`.
    Below,
}

impl FineWindowPolicy {
    /// Fine window bounds around `best`, clamped into `range`.
    pub fn bounds(self, best: i32, margin: i32, range: (i32, i32)) -> (i32, i32) {
        let (min, max) = range;
        let lo = best.saturating_sub(margin).clamp(min, max);
        let hi = match self {
            FineWindowPolicy::Centered => best.saturating_add(margin),
            FineWindowPolicy::Below => best,
        };
        (lo, hi.clamp(min, max))
    }
}

/// Two-stage scan configuration.
#[derive(Debug, Clone)]
pub struct ScanCfg {
    /// Step of the global sweep, in actuator units.
    pub coarse_step: i32,
    /// Step of the local refinement. Must be smaller than `coarse_step`.
    pub fine_step: i32,
    /// Half-width of the fine window. `None` uses `coarse_step`.
    pub fine_margin: Option<i32>,
    pub fine_window: FineWindowPolicy,
    /// Calls ignored after every actuator move before scores are trusted again.
    pub settle_frames: u32,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            coarse_step: 80,
            fine_step: 10,
            fine_margin: None,
            fine_window: FineWindowPolicy::Centered,
            settle_frames: 2,
        }
    }
}

impl ScanCfg {
    #[inline]
    pub fn margin(&self) -> i32 {
        self.fine_margin.unwrap_or(self.coarse_step)
    }
}

/// Direction of the final approach onto the focus target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BacklashDirection {
    #[default]
    FromBelow,
    FromAbove,
}

/// Backlash compensation when landing on the final position.
#[derive(Debug, Clone)]
pub struct BacklashCfg {
    pub enabled: bool,
    pub direction: BacklashDirection,
    /// Distance of the approach point from the target, in actuator units.
    pub overshoot: i32,
    /// Calls to wait after each of the two landing moves.
    pub settle_frames: u32,
}

impl Default for BacklashCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: BacklashDirection::FromBelow,
            overshoot: 30,
            settle_frames: 3,
        }
    }
}

impl BacklashCfg {
    /// Position commanded before the target so the last move always travels in `direction`.
    pub fn approach_point(&self, target: i32, range: (i32, i32)) -> i32 {
        let p = match self.direction {
            BacklashDirection::FromBelow => target.saturating_sub(self.overshoot),
            BacklashDirection::FromAbove => target.saturating_add(self.overshoot),
        };
        p.clamp(range.0, range.1)
    }
}

/// Result sanity threshold.
#[derive(Debug, Clone)]
pub struct ConfidenceCfg {
    /// Best scores below this mark the outcome as low confidence.
    pub min_score: f64,
}

impl Default for ConfidenceCfg {
    fn default() -> Self {
        Self { min_score: 5.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_window_clamps_to_range() {
        let p = FineWindowPolicy::Centered;
        assert_eq!(p.bounds(640, 80, (0, 1200)), (560, 720));
        assert_eq!(p.bounds(40, 80, (0, 1200)), (0, 120));
        assert_eq!(p.bounds(1180, 80, (0, 1200)), (1100, 1200));
    }

    #[test]
    fn below_window_ends_at_best() {
        let p = FineWindowPolicy::Below;
        assert_eq!(p.bounds(640, 80, (0, 1200)), (560, 640));
        assert_eq!(p.bounds(0, 80, (0, 1200)), (0, 0));
    }

    #[test]
    fn approach_point_respects_direction_and_range() {
        let mut b = BacklashCfg::default();
        assert_eq!(b.approach_point(500, (0, 1200)), 470);
        assert_eq!(b.approach_point(10, (0, 1200)), 0);
        b.direction = BacklashDirection::FromAbove;
        assert_eq!(b.approach_point(500, (0, 1200)), 530);
        assert_eq!(b.approach_point(1190, (0, 1200)), 1200);
    }

    #[test]
    fn margin_defaults_to_coarse_step() {
        let mut s = ScanCfg::default();
        assert_eq!(s.margin(), 80);
        s.fine_margin = Some(25);
        assert_eq!(s.margin(), 25);
    }
}
