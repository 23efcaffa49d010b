//! `From` implementations bridging `focus_config` types to `focus_core` types.

use crate::config::{
    BacklashCfg, BacklashDirection, ConfidenceCfg, FilterCfg, FineWindowPolicy, Roi, ScanCfg,
    SharpnessCfg, SharpnessMetric,
};
use crate::runner::RunMode;

// ── SharpnessCfg ─────────────────────────────────────────────────────────────

impl From<&focus_config::SharpnessCfg> for SharpnessCfg {
    fn from(c: &focus_config::SharpnessCfg) -> Self {
        let metric = match c.metric {
            focus_config::Metric::LaplacianVariance => SharpnessMetric::LaplacianVariance,
            focus_config::Metric::Tenengrad => SharpnessMetric::Tenengrad,
        };
        let roi = match c.roi {
            Some(r) => Roi::Rect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
            },
            None if c.roi_fraction >= 1.0 => Roi::Full,
            None => Roi::Central(c.roi_fraction),
        };
        Self {
            metric,
            roi,
            blur_sigma: c.blur_sigma,
            edge_floor: c.edge_floor,
        }
    }
}

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&focus_config::FilterCfg> for FilterCfg {
    fn from(c: &focus_config::FilterCfg) -> Self {
        Self {
            median_window: c.median_window,
        }
    }
}

// ── ScanCfg ──────────────────────────────────────────────────────────────────

impl From<&focus_config::ScanCfg> for ScanCfg {
    fn from(c: &focus_config::ScanCfg) -> Self {
        Self {
            coarse_step: c.coarse_step,
            fine_step: c.fine_step,
            fine_margin: c.fine_margin,
            fine_window: match c.fine_window {
                focus_config::FineWindow::Centered => FineWindowPolicy::Centered,
                focus_config::FineWindow::Below => FineWindowPolicy::Below,
            },
            settle_frames: c.settle_frames,
        }
    }
}

// ── BacklashCfg ──────────────────────────────────────────────────────────────

impl From<&focus_config::BacklashCfg> for BacklashCfg {
    fn from(c: &focus_config::BacklashCfg) -> Self {
        Self {
            enabled: c.enabled,
            direction: match c.direction {
                focus_config::ApproachDirection::FromBelow => BacklashDirection::FromBelow,
                focus_config::ApproachDirection::FromAbove => BacklashDirection::FromAbove,
            },
            overshoot: c.overshoot,
            settle_frames: c.settle_frames,
        }
    }
}

// ── ConfidenceCfg ────────────────────────────────────────────────────────────

impl From<&focus_config::ConfidenceCfg> for ConfidenceCfg {
    fn from(c: &focus_config::ConfidenceCfg) -> Self {
        Self {
            min_score: c.min_score,
        }
    }
}

// ── RunMode ──────────────────────────────────────────────────────────────────

impl From<focus_config::RunMode> for RunMode {
    fn from(m: focus_config::RunMode) -> Self {
        match m {
            focus_config::RunMode::Pump => RunMode::Pump,
            focus_config::RunMode::Direct => RunMode::Direct,
        }
    }
}
