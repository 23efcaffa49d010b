//! The autofocus state machine (`AutofocusCore`).
//!
//! One `step()` per delivered frame: validate, honour the settle countdown,
//! score, smooth, feed the active stage scanner, and issue at most one
//! actuator command. Nothing in here sleeps or waits for another frame.

use focus_traits::{Focuser, Frame};

use crate::config::*;
use crate::error::{FocusError, Report, Result};
use crate::filter::ScoreFilter;
use crate::hw_error::map_hw_error;
use crate::scanner::{BestCandidate, ScanStep, ScanWindow, StageScanner};
use crate::sharpness::SharpnessEstimator;
use crate::status::{FocusOutcome, FocusStatus, ScanStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    /// Parked at the approach point, waiting to move onto the target.
    Approach,
    /// Parked on the target, waiting before reporting done.
    Land,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Coarse(StageScanner),
    Fine(StageScanner),
    Settling { target: BestCandidate, leg: Leg },
    Done(FocusOutcome),
    Error(FocusError),
}

/// Mutable per-session state; rebuilt from scratch by `start()` and `reset()`.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    phase: Phase,
    filter: ScoreFilter,
    settle_remaining: u32,
    commanded: Option<i32>,
}

impl Session {
    pub(crate) fn new(median_window: usize) -> Self {
        Self {
            phase: Phase::Idle,
            filter: ScoreFilter::new(median_window),
            settle_remaining: 0,
            commanded: None,
        }
    }
}

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
pub struct AutofocusCore<F: Focuser> {
    pub(crate) focuser: F,
    pub(crate) range: (i32, i32),
    pub(crate) estimator: SharpnessEstimator,
    pub(crate) filter: FilterCfg,
    pub(crate) scan: ScanCfg,
    pub(crate) backlash: BacklashCfg,
    pub(crate) confidence: ConfidenceCfg,
    pub(crate) session: Session,
}

impl<F: Focuser> core::fmt::Debug for AutofocusCore<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AutofocusCore")
            .field("range", &self.range)
            .field("stage", &self.stage())
            .field("commanded", &self.session.commanded)
            .field("settle_remaining", &self.session.settle_remaining)
            .finish()
    }
}

impl<F: Focuser> AutofocusCore<F> {
    /// Inclusive actuator limits captured at build time.
    pub fn range(&self) -> (i32, i32) {
        self.range
    }

    pub fn focuser(&self) -> &F {
        &self.focuser
    }

    pub fn scan_cfg(&self) -> &ScanCfg {
        &self.scan
    }

    pub fn estimator(&self) -> &SharpnessEstimator {
        &self.estimator
    }

    pub fn stage(&self) -> ScanStage {
        match self.session.phase {
            Phase::Idle => ScanStage::Idle,
            Phase::Coarse(_) => ScanStage::Coarse,
            Phase::Fine(_) => ScanStage::Fine,
            Phase::Settling { .. } => ScanStage::Settling,
            Phase::Done(_) => ScanStage::Done,
            Phase::Error(_) => ScanStage::Error,
        }
    }

    /// True while a session is in Coarse, Fine or Settling.
    pub fn is_active(&self) -> bool {
        matches!(
            self.session.phase,
            Phase::Coarse(_) | Phase::Fine(_) | Phase::Settling { .. }
        )
    }

    /// Last position successfully commanded in this session.
    pub fn commanded_position(&self) -> Option<i32> {
        self.session.commanded
    }

    /// Best candidate of the current stage, or the final result once done.
    pub fn best(&self) -> Option<BestCandidate> {
        match &self.session.phase {
            Phase::Coarse(s) | Phase::Fine(s) => Some(s.best()).filter(BestCandidate::is_scored),
            Phase::Settling { target, .. } => Some(*target),
            Phase::Done(o) => Some(BestCandidate {
                position: o.position,
                score: o.score,
            }),
            Phase::Idle | Phase::Error(_) => None,
        }
    }

    /// Calls still to be ignored after the last actuator move.
    pub fn settle_remaining(&self) -> u32 {
        self.session.settle_remaining
    }

    /// Position reported by the focuser. Telemetry only.
    pub fn focuser_position(&mut self) -> Result<i32> {
        self.focuser
            .get()
            .map_err(|e| Report::new(map_hw_error(&*e)).wrap_err("reading focus position"))
    }

    /// Current status without advancing anything.
    pub fn status(&self) -> FocusStatus {
        match &self.session.phase {
            Phase::Idle => FocusStatus::Idle,
            Phase::Done(o) => FocusStatus::Complete(*o),
            Phase::Error(e) => FocusStatus::Failed(e.clone()),
            _ => FocusStatus::Scanning(self.stage()),
        }
    }

    /// Drop all session state and return to Idle. The lens stays where it is.
    pub fn reset(&mut self) {
        self.session = Session::new(self.filter.median_window);
    }

    /// Begin a session over `window_hint` (clamped into the actuator range) or
    /// the full range.
    pub fn start(&mut self, window_hint: Option<(i32, i32)>) -> Result<()> {
        if self.is_active() {
            return Err(Report::new(FocusError::State(format!(
                "focus session already running (stage {})",
                self.stage()
            ))));
        }
        self.reset();

        let (min, max) = self.range;
        let (start, end) = match window_hint {
            Some((s, e)) => (s.clamp(min, max), e.clamp(min, max)),
            None => self.range,
        };
        let window = match ScanWindow::new(start, end, self.scan.coarse_step) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(?window_hint, start, end, error = %e, "rejecting coarse window");
                self.session.phase = Phase::Error(e.clone());
                return Err(Report::new(e));
            }
        };

        tracing::info!(
            start,
            end,
            step = window.step(),
            samples = window.sample_count(),
            "coarse scan started"
        );
        self.session.phase = Phase::Coarse(StageScanner::new(window));
        self.command(start, self.scan.settle_frames)
    }

    /// Advance the session by one frame.
    ///
    /// A missing or structurally invalid frame is skipped without consuming the
    /// settle countdown. The first actuator failure is returned as `Err`; every
    /// later call reports `Failed`.
    pub fn step(&mut self, frame: Option<&Frame>) -> Result<FocusStatus> {
        if let Some(status) = self.terminal_status() {
            return Ok(status);
        }
        let Some(frame) = frame else {
            tracing::trace!("no frame this tick");
            return Ok(self.status());
        };
        if let Err(e) = self.estimator.validate(frame) {
            tracing::debug!(error = %e, "skipping frame");
            return Ok(self.status());
        }
        if self.consume_settle() {
            return Ok(self.status());
        }
        if matches!(self.session.phase, Phase::Settling { .. }) {
            return self.settle_leg();
        }
        match self.estimator.score(frame) {
            Ok(raw) => self.advance(raw),
            Err(e) => {
                tracing::debug!(error = %e, "skipping frame");
                Ok(self.status())
            }
        }
    }

    /// Advance the session with a sharpness score computed elsewhere.
    ///
    /// Non-finite or negative scores are treated like an invalid frame.
    pub fn step_from_score(&mut self, raw: f64) -> Result<FocusStatus> {
        if let Some(status) = self.terminal_status() {
            return Ok(status);
        }
        if !raw.is_finite() || raw < 0.0 {
            tracing::debug!(raw, "skipping unusable score");
            return Ok(self.status());
        }
        if self.consume_settle() {
            return Ok(self.status());
        }
        if matches!(self.session.phase, Phase::Settling { .. }) {
            return self.settle_leg();
        }
        self.advance(raw)
    }

    // ── Private: stage transitions ───────────────────────────────────────────

    fn terminal_status(&self) -> Option<FocusStatus> {
        match self.session.phase {
            Phase::Idle | Phase::Done(_) | Phase::Error(_) => Some(self.status()),
            _ => None,
        }
    }

    /// Burn one settle slot; true when this call must not score.
    fn consume_settle(&mut self) -> bool {
        if self.session.settle_remaining == 0 {
            return false;
        }
        self.session.settle_remaining -= 1;
        tracing::trace!(remaining = self.session.settle_remaining, "settling");
        true
    }

    fn advance(&mut self, raw: f64) -> Result<FocusStatus> {
        let score = self.session.filter.push(raw);
        let settle = self.scan.settle_frames;
        match &mut self.session.phase {
            Phase::Coarse(scanner) => {
                let position = scanner.position();
                let step = scanner.observe(score);
                tracing::debug!(stage = "coarse", position, raw, score, "sample");
                match step {
                    ScanStep::Advance(next) => {
                        self.command(next, settle)?;
                        Ok(FocusStatus::Scanning(ScanStage::Coarse))
                    }
                    ScanStep::Complete(best) => self.enter_fine(best),
                }
            }
            Phase::Fine(scanner) => {
                let position = scanner.position();
                let step = scanner.observe(score);
                tracing::debug!(stage = "fine", position, raw, score, "sample");
                match step {
                    ScanStep::Advance(next) => {
                        self.command(next, settle)?;
                        Ok(FocusStatus::Scanning(ScanStage::Fine))
                    }
                    ScanStep::Complete(best) => self.finish(best),
                }
            }
            _ => Ok(self.status()),
        }
    }

    fn enter_fine(&mut self, coarse_best: BestCandidate) -> Result<FocusStatus> {
        let (lo, hi) =
            self.scan
                .fine_window
                .bounds(coarse_best.position, self.scan.margin(), self.range);
        let window = match ScanWindow::new(lo, hi, self.scan.fine_step) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(lo, hi, error = %e, "rejecting fine window");
                self.session.phase = Phase::Error(e.clone());
                return Err(Report::new(e));
            }
        };
        tracing::info!(
            coarse_best = coarse_best.position,
            coarse_score = coarse_best.score,
            start = lo,
            end = hi,
            step = window.step(),
            "fine scan started"
        );
        self.session.filter.reset();
        self.session.phase = Phase::Fine(StageScanner::new(window));
        self.command(lo, self.scan.settle_frames)?;
        Ok(FocusStatus::Scanning(ScanStage::Fine))
    }

    fn finish(&mut self, best: BestCandidate) -> Result<FocusStatus> {
        tracing::info!(position = best.position, score = best.score, "fine scan complete");
        if self.backlash.enabled {
            let approach = self.backlash.approach_point(best.position, self.range);
            self.session.phase = Phase::Settling {
                target: best,
                leg: Leg::Approach,
            };
            self.command(approach, self.backlash.settle_frames)?;
            return Ok(FocusStatus::Scanning(ScanStage::Settling));
        }
        self.command(best.position, 0)?;
        Ok(self.complete(best))
    }

    fn settle_leg(&mut self) -> Result<FocusStatus> {
        let Phase::Settling { target, leg } = self.session.phase else {
            return Ok(self.status());
        };
        match leg {
            Leg::Approach => {
                self.session.phase = Phase::Settling {
                    target,
                    leg: Leg::Land,
                };
                self.command(target.position, self.backlash.settle_frames)?;
                Ok(FocusStatus::Scanning(ScanStage::Settling))
            }
            Leg::Land => Ok(self.complete(target)),
        }
    }

    fn complete(&mut self, best: BestCandidate) -> FocusStatus {
        let low_confidence = best.score < self.confidence.min_score;
        if low_confidence {
            tracing::warn!(
                position = best.position,
                score = best.score,
                min_score = self.confidence.min_score,
                "low-confidence focus result (dark or low-contrast scene?)"
            );
        }
        let outcome = FocusOutcome {
            position: best.position,
            score: best.score,
            low_confidence,
        };
        tracing::info!(position = outcome.position, score = outcome.score, "autofocus done");
        self.session.phase = Phase::Done(outcome);
        FocusStatus::Complete(outcome)
    }

    /// Command the lens and arm the settle countdown. On failure the session
    /// moves to Error and the fault is returned.
    fn command(&mut self, position: i32, settle: u32) -> Result<()> {
        let position = position.clamp(self.range.0, self.range.1);
        match self.focuser.set(position) {
            Ok(()) => {
                self.session.commanded = Some(position);
                self.session.settle_remaining = settle;
                Ok(())
            }
            Err(e) => {
                let err = map_hw_error(&*e);
                tracing::error!(position, error = %err, "focuser set failed; aborting session");
                self.session.phase = Phase::Error(err.clone());
                Err(Report::new(err).wrap_err(format!("setting focus position {position}")))
            }
        }
    }
}
