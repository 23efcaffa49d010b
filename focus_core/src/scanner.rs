//! Linear sweep over one scan window.
//!
//! The scanner owns no actuator: it reports where the lens should go next and
//! the caller performs the move.

use crate::error::FocusError;

/// `(start, end, step)` of one linear sweep, inclusive of both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    start: i32,
    end: i32,
    step: i32,
}

impl ScanWindow {
    pub fn new(start: i32, end: i32, step: i32) -> Result<Self, FocusError> {
        if step <= 0 {
            return Err(FocusError::Config(format!("scan step must be > 0 (got {step})")));
        }
        if start > end {
            return Err(FocusError::DegenerateScan { start, end });
        }
        Ok(Self { start, end, step })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Positions sampled by a full sweep; the last one is always `end`.
    pub fn positions(&self) -> impl Iterator<Item = i32> + '_ {
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let cur = next?;
            next = (cur < self.end).then(|| cur.saturating_add(self.step).min(self.end));
            Some(cur)
        })
    }

    /// Number of samples in a full sweep.
    pub fn sample_count(&self) -> usize {
        let span = (i64::from(self.end) - i64::from(self.start)) as u64;
        let step = self.step as u64;
        // ceil(span / step) moves plus the starting sample
        (span.div_ceil(step) + 1) as usize
    }
}

/// Highest score seen in a stage and where it was seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestCandidate {
    pub position: i32,
    pub score: f64,
}

impl BestCandidate {
    /// Placeholder before the first sample; any finite score beats it.
    pub fn unscored(position: i32) -> Self {
        Self {
            position,
            score: f64::NEG_INFINITY,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_finite()
    }
}

/// What the caller should do after feeding a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanStep {
    /// Move the lens here, then score again.
    Advance(i32),
    /// `end` has been scored; no move required.
    Complete(BestCandidate),
}

#[derive(Debug, Clone)]
pub struct StageScanner {
    window: ScanWindow,
    position: i32,
    best: BestCandidate,
    samples: usize,
    complete: bool,
}

impl StageScanner {
    /// Scanner positioned at `window.start()`; the caller commands that position.
    pub fn new(window: ScanWindow) -> Self {
        Self {
            window,
            position: window.start,
            best: BestCandidate::unscored(window.start),
            samples: 0,
            complete: false,
        }
    }

    pub fn window(&self) -> &ScanWindow {
        &self.window
    }

    /// Position the next score is attributed to.
    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn best(&self) -> BestCandidate {
        self.best
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Attribute `score` to the current position and advance.
    ///
    /// Best only moves on a strictly greater score, so ties keep the earliest
    /// position. After completion every call returns the same `Complete`.
    pub fn observe(&mut self, score: f64) -> ScanStep {
        if self.complete {
            return ScanStep::Complete(self.best);
        }
        self.samples += 1;
        if score > self.best.score {
            self.best = BestCandidate {
                position: self.position,
                score,
            };
        }
        if self.position >= self.window.end {
            self.complete = true;
            return ScanStep::Complete(self.best);
        }
        self.position = self
            .position
            .saturating_add(self.window.step)
            .min(self.window.end);
        ScanStep::Advance(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sweep(window: ScanWindow, score: impl Fn(i32) -> f64) -> (Vec<i32>, BestCandidate) {
        let mut s = StageScanner::new(window);
        let mut visited = vec![s.position()];
        loop {
            match s.observe(score(s.position())) {
                ScanStep::Advance(p) => visited.push(p),
                ScanStep::Complete(best) => return (visited, best),
            }
        }
    }

    #[rstest]
    #[case(0, 1200, 80, 16)]
    #[case(0, 100, 30, 5)]
    #[case(560, 720, 10, 17)]
    #[case(5, 5, 10, 1)]
    #[case(0, 1, 100, 2)]
    fn sample_count_matches_sweep(
        #[case] start: i32,
        #[case] end: i32,
        #[case] step: i32,
        #[case] expected: usize,
    ) {
        let w = ScanWindow::new(start, end, step).unwrap();
        assert_eq!(w.sample_count(), expected);
        assert_eq!(w.positions().count(), expected);
        let (visited, _) = sweep(w, |_| 1.0);
        assert_eq!(visited.len(), expected);
        assert_eq!(visited.last().copied(), Some(end));
    }

    #[test]
    fn uneven_span_clamps_last_sample_to_end() {
        let w = ScanWindow::new(0, 100, 30).unwrap();
        assert_eq!(w.positions().collect::<Vec<_>>(), vec![0, 30, 60, 90, 100]);
    }

    #[test]
    fn rejects_bad_windows() {
        assert_eq!(
            ScanWindow::new(10, 5, 1),
            Err(FocusError::DegenerateScan { start: 10, end: 5 })
        );
        assert!(matches!(
            ScanWindow::new(0, 5, 0),
            Err(FocusError::Config(_))
        ));
    }

    #[test]
    fn best_updates_only_on_strict_improvement() {
        let w = ScanWindow::new(0, 40, 10).unwrap();
        let scores = [5.0, 9.0, 9.0, 3.0, 12.0];
        let mut s = StageScanner::new(w);
        let mut trail = Vec::new();
        for v in scores {
            s.observe(v);
            trail.push(s.best());
        }
        assert_eq!(trail[1].position, 10);
        assert_eq!(trail[2].position, 10, "tie must not move best");
        assert_eq!(trail[3].position, 10);
        assert_eq!(trail[4].position, 40);
        assert!(s.is_complete());
    }

    #[test]
    fn observe_after_complete_is_stable() {
        let w = ScanWindow::new(0, 10, 10).unwrap();
        let mut s = StageScanner::new(w);
        s.observe(1.0);
        let done = s.observe(2.0);
        assert_eq!(s.observe(99.0), done);
        assert_eq!(s.samples(), 2);
        assert_eq!(s.best().position, 10);
    }

    #[test]
    fn finds_peak_on_coarse_grid() {
        let w = ScanWindow::new(0, 1200, 80).unwrap();
        let (_, best) = sweep(w, |p| if p == 640 { 100.0 } else { 50.0 - (p as f64) / 100.0 });
        assert_eq!(best.position, 640);
        assert_eq!(best.score, 100.0);
    }
}
