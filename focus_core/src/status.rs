//! Session stages and the status returned from each controller step.

use crate::error::FocusError;

/// Externally visible stage of a focus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Idle,
    Coarse,
    Fine,
    Settling,
    Done,
    Error,
}

impl ScanStage {
    pub fn name(self) -> &'static str {
        match self {
            ScanStage::Idle => "idle",
            ScanStage::Coarse => "coarse",
            ScanStage::Fine => "fine",
            ScanStage::Settling => "settling",
            ScanStage::Done => "done",
            ScanStage::Error => "error",
        }
    }
}

impl core::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Final result of a completed session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusOutcome {
    /// Lens position with the highest filtered sharpness in the fine stage.
    pub position: i32,
    /// Filtered sharpness observed at `position`.
    pub score: f64,
    /// Set when `score` fell below the configured confidence threshold
    /// (dark or low-contrast scene). Advisory; the caller decides whether to retry.
    pub low_confidence: bool,
}

/// Status of a single `step()`.
#[derive(Debug, Clone, PartialEq)]
pub enum FocusStatus {
    /// No session has been started.
    Idle,
    /// Still searching; no result yet.
    Scanning(ScanStage),
    /// Session finished; repeated on every later call.
    Complete(FocusOutcome),
    /// Session ended on a fatal error; repeated on every later call.
    Failed(FocusError),
}

impl FocusStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, FocusStatus::Complete(_))
    }

    /// `(finished, best_position)` view of the status.
    pub fn as_pair(&self) -> (bool, Option<i32>) {
        match self {
            FocusStatus::Complete(outcome) => (true, Some(outcome.position)),
            FocusStatus::Idle | FocusStatus::Scanning(_) | FocusStatus::Failed(_) => (false, None),
        }
    }
}
