use crate::error::{FocusError, Report, Result as CoreResult};
use crate::pump::FramePump;
use crate::{
    BacklashCfg, ConfidenceCfg, FilterCfg, FocusOutcome, FocusStatus, ScanCfg, SharpnessCfg,
};
use focus_traits::clock::{Clock, MonotonicClock};
use focus_traits::{Focuser, Frame, FrameSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How frames reach the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Pull one frame from the source, then step; repeat.
    Direct,
    /// A `FramePump` thread owns the source; the loop steps on the newest frame.
    #[default]
    Pump,
}

/// Everything a single session needs besides the focuser and the frame source.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub sharpness: SharpnessCfg,
    pub filter: FilterCfg,
    pub scan: ScanCfg,
    pub backlash: BacklashCfg,
    pub confidence: ConfidenceCfg,
    /// Coarse window; `None` sweeps the whole actuator range.
    pub window_hint: Option<(i32, i32)>,
    pub mode: RunMode,
    /// Pump pacing.
    pub fps: u32,
    /// Per-frame wait handed to the source.
    pub frame_timeout_ms: u64,
    /// Hard cap for the whole session.
    pub max_run_ms: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            sharpness: SharpnessCfg::default(),
            filter: FilterCfg::default(),
            scan: ScanCfg::default(),
            backlash: BacklashCfg::default(),
            confidence: ConfidenceCfg::default(),
            window_hint: None,
            mode: RunMode::Pump,
            fps: 30,
            frame_timeout_ms: 200,
            max_run_ms: 30_000,
        }
    }
}

/// Per-session timing of the `step()` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    /// Frames handed to `step()`.
    pub frames: u64,
    pub max_step_us: u64,
    pub mean_step_us: f64,
    pub elapsed_ms: u64,
}

impl RunStats {
    fn record(&mut self, step_us: u64) {
        self.frames += 1;
        self.max_step_us = self.max_step_us.max(step_us);
        let n = self.frames as f64;
        self.mean_step_us += (step_us as f64 - self.mean_step_us) / n;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub outcome: FocusOutcome,
    pub stats: RunStats,
}

/// Compute the frame-stall watchdog threshold in milliseconds.
///
/// - `frame_timeout_ms`: per-frame wait handed to the source. Four of them
///   without a frame is the "fast" threshold.
/// - `period_ms`: frame period from `fps`, in [1, 1000]. The threshold spans at
///   least two periods so a single missed frame does not trip it.
/// - `max_run_ms`: the session cap. The threshold stays strictly below it so the
///   stall watchdog can still fire first; when the cap is shorter than two
///   periods the fast threshold is used.
#[inline]
fn compute_stall_threshold_ms(frame_timeout_ms: u64, period_ms: u64, max_run_ms: u64) -> u64 {
    debug_assert!((1..=crate::util::MILLIS_PER_SEC).contains(&period_ms));

    let fast = fast_threshold_ms(frame_timeout_ms);
    let two_p = two_periods_ms(period_ms);

    if max_run_ms < two_p {
        return cap_below_max_run(fast, max_run_ms);
    }

    let safe = std::cmp::max(fast, two_p);
    cap_below_max_run(safe, max_run_ms)
}

#[inline]
fn fast_threshold_ms(frame_timeout_ms: u64) -> u64 {
    frame_timeout_ms.saturating_mul(4)
}

#[inline]
fn two_periods_ms(period_ms: u64) -> u64 {
    period_ms.saturating_mul(2)
}

/// Cap a threshold to be strictly below `max_run_ms` and at least 1ms.
#[inline]
fn cap_below_max_run(threshold: u64, max_run_ms: u64) -> u64 {
    threshold.min(max_run_ms.saturating_sub(1)).max(1)
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Session-level guards shared by both run modes.
struct Watchdog {
    start: Instant,
    max_run_ms: u64,
    stall_threshold_ms: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl Watchdog {
    fn check(&self, stalled_ms: u64) -> Result<(), FocusError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            return Err(FocusError::Cancelled);
        }
        if stalled_ms > self.stall_threshold_ms {
            return Err(FocusError::FrameTimeout);
        }
        if elapsed_ms(self.start) >= self.max_run_ms {
            return Err(FocusError::State("max run time exceeded".into()));
        }
        Ok(())
    }
}

/// Drive one autofocus session over `source` until it completes or fails.
///
/// The controller never waits; all pacing, frame timeouts, the session cap
/// and cancellation live here. On failure the lens is left wherever it was
/// last commanded.
pub fn run<F, S>(
    focuser: F,
    source: S,
    params: RunParams,
    cancel: Option<Arc<AtomicBool>>,
) -> CoreResult<RunReport>
where
    F: Focuser,
    S: FrameSource + Send + 'static,
{
    let mut af = crate::build_autofocus(
        focuser,
        params.sharpness.clone(),
        params.filter.clone(),
        params.scan.clone(),
        params.backlash.clone(),
        params.confidence.clone(),
    )?;

    let period_ms = crate::util::period_ms(params.fps);
    let watchdog = Watchdog {
        start: Instant::now(),
        max_run_ms: params.max_run_ms,
        stall_threshold_ms: compute_stall_threshold_ms(
            params.frame_timeout_ms,
            period_ms,
            params.max_run_ms,
        ),
        cancel,
    };

    af.start(params.window_hint)?;
    tracing::info!(
        mode = ?params.mode,
        hint = ?params.window_hint,
        range = ?af.range(),
        "autofocus session start"
    );

    let mut stats = RunStats::default();
    let frame_timeout = Duration::from_millis(params.frame_timeout_ms);
    let mut step = |frame: &Frame, stats: &mut RunStats| -> CoreResult<Option<FocusOutcome>> {
        let t0 = Instant::now();
        let status = af.step(Some(frame))?;
        stats.record(t0.elapsed().as_micros().min(u128::from(u64::MAX)) as u64);
        match status {
            FocusStatus::Scanning(_) => Ok(None),
            FocusStatus::Complete(outcome) => Ok(Some(outcome)),
            FocusStatus::Failed(e) => Err(Report::new(e)),
            FocusStatus::Idle => Err(Report::new(FocusError::State(
                "controller returned to idle mid-session".into(),
            ))),
        }
    };

    let outcome = match params.mode {
        RunMode::Direct => {
            let mut source = source;
            let clock = MonotonicClock::new();
            let backoff = Duration::from_millis(period_ms);
            let mut last_frame = Instant::now();
            loop {
                watchdog.check(elapsed_ms(last_frame))?;
                let frame = match source.next_frame(frame_timeout) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // A failing source usually fails again at once.
                        tracing::debug!(error = %e, "frame source error");
                        clock.sleep(backoff);
                        None
                    }
                };
                let Some(frame) = frame else { continue };
                last_frame = Instant::now();
                if let Some(outcome) = step(&frame, &mut stats)? {
                    break outcome;
                }
            }
        }
        RunMode::Pump => {
            let pump =
                FramePump::spawn_paced(source, params.fps, frame_timeout, MonotonicClock::new());
            let poll = Duration::from_millis(period_ms);
            loop {
                watchdog.check(pump.stalled_for_now())?;
                let Some(frame) = pump.recv_timeout(poll) else {
                    continue;
                };
                if let Some(outcome) = step(&frame, &mut stats)? {
                    tracing::debug!(
                        delivered = pump.delivered(),
                        dropped = pump.dropped(),
                        source_errors = pump.source_errors(),
                        "frame pump totals"
                    );
                    break outcome;
                }
            }
        }
    };

    stats.elapsed_ms = elapsed_ms(watchdog.start);
    tracing::info!(
        position = outcome.position,
        score = outcome.score,
        low_confidence = outcome.low_confidence,
        frames = stats.frames,
        elapsed_ms = stats.elapsed_ms,
        "autofocus session complete"
    );
    Ok(RunReport { outcome, stats })
}

#[cfg(test)]
mod tests {
    use super::{cap_below_max_run, compute_stall_threshold_ms, fast_threshold_ms, two_periods_ms};

    #[test]
    fn fast_threshold_scales_by_four() {
        assert_eq!(fast_threshold_ms(0), 0);
        assert_eq!(fast_threshold_ms(1), 4);
        assert_eq!(fast_threshold_ms(200), 800);
    }

    #[test]
    fn two_periods_is_double_period() {
        assert_eq!(two_periods_ms(1), 2);
        assert_eq!(two_periods_ms(33), 66);
    }

    #[test]
    fn cap_below_max_run_enforces_bounds() {
        assert_eq!(cap_below_max_run(5000, 100), 99);
        assert_eq!(cap_below_max_run(10, 1), 1);
        assert_eq!(cap_below_max_run(5, 100), 5);
    }

    #[test]
    fn compute_threshold_uses_max_of_fast_and_two_periods() {
        // fast=800, two_p=66 -> 800
        assert_eq!(compute_stall_threshold_ms(200, 33, 30_000), 800);
        // fast=20, two_p=66 -> 66
        assert_eq!(compute_stall_threshold_ms(5, 33, 30_000), 66);
    }

    #[test]
    fn compute_threshold_handles_small_max_run() {
        // max_run < two_p: fast threshold, capped below max_run
        assert_eq!(compute_stall_threshold_ms(10, 100, 50), 40);
        assert_eq!(compute_stall_threshold_ms(2000, 10, 100), 99);
        assert_eq!(compute_stall_threshold_ms(10, 10, 1), 1);
    }
}
