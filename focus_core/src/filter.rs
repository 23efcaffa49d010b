//! Rolling-median smoothing of sharpness scores.

use std::collections::VecDeque;

/// Median over the last `window` raw scores.
///
/// Until the window is full the raw score passes through unchanged, so the
/// added lag is at most `window - 1` samples.
#[derive(Debug, Clone)]
pub struct ScoreFilter {
    window: usize,
    buf: VecDeque<f64>,
    scratch: Vec<f64>,
}

impl Default for ScoreFilter {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ScoreFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buf: VecDeque::with_capacity(window),
            scratch: Vec::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Record `raw` and return the filtered score.
    pub fn push(&mut self, raw: f64) -> f64 {
        self.buf.push_back(raw);
        if self.buf.len() > self.window {
            self.buf.pop_front();
        }
        if self.window == 1 || self.buf.len() < self.window {
            return raw;
        }
        self.scratch.clear();
        self.scratch.extend(self.buf.iter().copied());
        self.scratch.sort_unstable_by(f64::total_cmp);
        let n = self.scratch.len();
        debug_assert_eq!(n, self.window);
        let mid = n / 2;
        if n % 2 == 0 {
            (self.scratch[mid - 1] + self.scratch[mid]) / 2.0
        } else {
            self.scratch[mid]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_raw_until_full() {
        let mut f = ScoreFilter::new(3);
        assert_eq!(f.push(10.0), 10.0);
        assert_eq!(f.push(50.0), 50.0);
        assert_eq!(f.push(20.0), 20.0);
    }

    #[test]
    fn suppresses_single_outlier() {
        let mut f = ScoreFilter::new(3);
        f.push(10.0);
        f.push(11.0);
        assert_eq!(f.push(500.0), 11.0);
        assert_eq!(f.push(12.0), 12.0);
        assert_eq!(f.push(13.0), 13.0);
    }

    #[test]
    fn constant_input_is_fixed_point() {
        let mut f = ScoreFilter::new(3);
        for _ in 0..10 {
            assert_eq!(f.push(42.5), 42.5);
        }
    }

    #[test]
    fn window_one_is_passthrough() {
        let mut f = ScoreFilter::new(1);
        assert_eq!(f.push(3.0), 3.0);
        assert_eq!(f.push(900.0), 900.0);
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn even_window_averages_middle_pair() {
        let mut f = ScoreFilter::new(4);
        for v in [1.0, 9.0, 3.0] {
            f.push(v);
        }
        assert_eq!(f.push(5.0), 4.0);
    }

    #[test]
    fn reset_restarts_fill() {
        let mut f = ScoreFilter::new(3);
        f.push(1.0);
        f.push(2.0);
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.push(100.0), 100.0);
    }
}
