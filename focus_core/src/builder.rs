//! Type-state builder for `Autofocus` and generic `build_autofocus` constructor.
//!
//! The builder enforces at compile time that a focuser is provided before
//! `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;

use focus_traits::{Focuser, Frame};

use crate::config::*;
use crate::core::{AutofocusCore, Session};
use crate::error::{BuildError, Result};
use crate::scanner::BestCandidate;
use crate::sharpness::SharpnessEstimator;
use crate::status::{FocusStatus, ScanStage};

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Autofocus controller over a boxed focuser.
pub struct Autofocus {
    pub(crate) inner: AutofocusCore<Box<dyn Focuser>>,
}

impl core::fmt::Debug for Autofocus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Autofocus")
            .field("range", &self.inner.range())
            .field("stage", &self.inner.stage())
            .field("commanded", &self.inner.commanded_position())
            .finish()
    }
}

impl Autofocus {
    /// Start building an Autofocus.
    pub fn builder() -> AutofocusBuilder<Missing> {
        AutofocusBuilder::default()
    }

    /// Begin a session; see [`AutofocusCore::start`].
    pub fn start(&mut self, window_hint: Option<(i32, i32)>) -> Result<()> {
        self.inner.start(window_hint)
    }

    /// One non-blocking iteration; see [`AutofocusCore::step`].
    pub fn step(&mut self, frame: Option<&Frame>) -> Result<FocusStatus> {
        self.inner.step(frame)
    }

    /// Step with a precomputed sharpness score.
    pub fn step_from_score(&mut self, raw: f64) -> Result<FocusStatus> {
        self.inner.step_from_score(raw)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn status(&self) -> FocusStatus {
        self.inner.status()
    }

    pub fn stage(&self) -> ScanStage {
        self.inner.stage()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn best(&self) -> Option<BestCandidate> {
        self.inner.best()
    }

    pub fn commanded_position(&self) -> Option<i32> {
        self.inner.commanded_position()
    }

    /// Telemetry: position reported by the focuser.
    pub fn focuser_position(&mut self) -> Result<i32> {
        self.inner.focuser_position()
    }

    pub fn range(&self) -> (i32, i32) {
        self.inner.range()
    }

    pub fn scan_cfg(&self) -> &ScanCfg {
        self.inner.scan_cfg()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Autofocus`. All fields are validated on `build()`.
pub struct AutofocusBuilder<F> {
    focuser: Option<Box<dyn Focuser>>,
    sharpness: Option<SharpnessCfg>,
    filter: Option<FilterCfg>,
    scan: Option<ScanCfg>,
    backlash: Option<BacklashCfg>,
    confidence: Option<ConfidenceCfg>,
    _f: PhantomData<F>,
}

impl Default for AutofocusBuilder<Missing> {
    fn default() -> Self {
        Self {
            focuser: None,
            sharpness: None,
            filter: None,
            scan: None,
            backlash: None,
            confidence: None,
            _f: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct an `AutofocusCore`.
///
/// Shared by `AutofocusBuilder::try_build()` and `build_autofocus()`.
fn validate_and_build<F: Focuser>(
    focuser: F,
    sharpness: SharpnessCfg,
    filter: FilterCfg,
    scan: ScanCfg,
    backlash: BacklashCfg,
    confidence: ConfidenceCfg,
) -> Result<AutofocusCore<F>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if scan.coarse_step <= 0 || scan.fine_step <= 0 {
        return Err(invalid("scan steps must be > 0"));
    }
    if scan.fine_step >= scan.coarse_step {
        return Err(invalid("fine_step must be smaller than coarse_step"));
    }
    if scan.margin() <= 0 {
        return Err(invalid("fine_margin must be > 0"));
    }
    if filter.median_window == 0 {
        return Err(invalid("median_window must be >= 1"));
    }
    match sharpness.roi {
        Roi::Central(f) if !(f > 0.0 && f <= 1.0) => {
            return Err(invalid("roi fraction must be in (0, 1]"));
        }
        Roi::Rect { width, height, .. } if width == 0 || height == 0 => {
            return Err(invalid("roi rectangle must be non-empty"));
        }
        _ => {}
    }
    if !sharpness.blur_sigma.is_finite() || sharpness.blur_sigma < 0.0 {
        return Err(invalid("blur_sigma must be >= 0"));
    }
    if !sharpness.edge_floor.is_finite() || sharpness.edge_floor < 0.0 {
        return Err(invalid("edge_floor must be >= 0"));
    }
    if backlash.overshoot < 0 {
        return Err(invalid("backlash overshoot must be >= 0"));
    }
    if !confidence.min_score.is_finite() || confidence.min_score < 0.0 {
        return Err(invalid("min_score must be finite and >= 0"));
    }
    let range = focuser.range();
    if range.0 >= range.1 {
        return Err(invalid("focuser range must be non-empty (min < max)"));
    }

    tracing::debug!(
        ?range,
        coarse_step = scan.coarse_step,
        fine_step = scan.fine_step,
        settle_frames = scan.settle_frames,
        backlash = backlash.enabled,
        "autofocus built"
    );

    let session = Session::new(filter.median_window);
    Ok(AutofocusCore {
        focuser,
        range,
        estimator: SharpnessEstimator::new(sharpness),
        filter,
        scan,
        backlash,
        confidence,
        session,
    })
}

impl<F> AutofocusBuilder<F> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Autofocus> {
        let focuser = self
            .focuser
            .ok_or_else(|| eyre::Report::new(BuildError::MissingFocuser))?;
        let inner = validate_and_build(
            focuser,
            self.sharpness.unwrap_or_default(),
            self.filter.unwrap_or_default(),
            self.scan.unwrap_or_default(),
            self.backlash.unwrap_or_default(),
            self.confidence.unwrap_or_default(),
        )?;
        Ok(Autofocus { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<F> AutofocusBuilder<F> {
    pub fn with_sharpness(mut self, sharpness: SharpnessCfg) -> Self {
        self.sharpness = Some(sharpness);
        self
    }
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn with_scan(mut self, scan: ScanCfg) -> Self {
        self.scan = Some(scan);
        self
    }
    pub fn with_backlash(mut self, backlash: BacklashCfg) -> Self {
        self.backlash = Some(backlash);
        self
    }
    pub fn with_confidence(mut self, confidence: ConfidenceCfg) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

impl AutofocusBuilder<Missing> {
    pub fn with_focuser(self, focuser: impl Focuser + 'static) -> AutofocusBuilder<Set> {
        AutofocusBuilder {
            focuser: Some(Box::new(focuser)),
            sharpness: self.sharpness,
            filter: self.filter,
            scan: self.scan,
            backlash: self.backlash,
            confidence: self.confidence,
            _f: PhantomData,
        }
    }
}

impl AutofocusBuilder<Set> {
    /// Validate and build. Only available once a focuser is set.
    pub fn build(self) -> Result<Autofocus> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type AutofocusG<F> = AutofocusCore<F>;

/// Build a statically-dispatched `AutofocusG` from a concrete focuser.
pub fn build_autofocus<F: Focuser>(
    focuser: F,
    sharpness: SharpnessCfg,
    filter: FilterCfg,
    scan: ScanCfg,
    backlash: BacklashCfg,
    confidence: ConfidenceCfg,
) -> Result<AutofocusG<F>> {
    validate_and_build(focuser, sharpness, filter, scan, backlash, confidence)
}
