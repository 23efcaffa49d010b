//! Lens actuators and frame sources.
//!
//! The simulated rig (`SimulatedLens` + `SimulatedFocuser` + `SyntheticScene`)
//! runs anywhere; the I2C lens controller driver needs feature `hardware`.
//! `RawRgbReader` turns a raw `rgb24` byte stream into frames.
pub mod error;
#[cfg(feature = "hardware")]
pub mod i2c;
pub mod raw;
pub mod scene;
pub mod util;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use focus_traits::Focuser;

use crate::error::{HwError, Result};

pub use raw::RawRgbReader;
pub use scene::{SceneCfg, SyntheticScene};

/// Behaviour of the simulated focus motor.
#[derive(Debug, Clone)]
pub struct SimLensCfg {
    /// Inclusive actuator limits.
    pub range: (i32, i32),
    /// Rendered frames before a commanded move becomes visible.
    pub latency_frames: u32,
    /// Slack left above the target whenever the lens is driven downwards.
    pub backlash: i32,
    /// Fail every `set` once this many moves have succeeded.
    pub fault_after: Option<usize>,
}

impl Default for SimLensCfg {
    fn default() -> Self {
        Self {
            range: (0, 1200),
            latency_frames: 1,
            backlash: 0,
            fault_after: None,
        }
    }
}

#[derive(Debug)]
struct LensState {
    commanded: i32,
    /// Where the lens ends up once the pending move completes.
    resting: i32,
    physical: i32,
    pending: u32,
    history: Vec<i32>,
}

/// Shared simulated lens. Clones observe the same motor, so the focuser and
/// the scene rendering it can live on different threads.
#[derive(Debug, Clone)]
pub struct SimulatedLens {
    cfg: Arc<SimLensCfg>,
    state: Arc<Mutex<LensState>>,
}

impl SimulatedLens {
    pub fn new(cfg: SimLensCfg) -> Self {
        let start = cfg.range.0;
        Self {
            cfg: Arc::new(cfg),
            state: Arc::new(Mutex::new(LensState {
                commanded: start,
                resting: start,
                physical: start,
                pending: 0,
                history: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LensState> {
        // The state stays consistent even if a holder panicked mid-test.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cfg(&self) -> &SimLensCfg {
        &self.cfg
    }

    /// Start a move to `position`.
    pub fn command(&self, position: i32) -> Result<()> {
        let (min, max) = self.cfg.range;
        if !(min..=max).contains(&position) {
            return Err(HwError::OutOfRange { position, min, max });
        }
        let mut st = self.lock();
        if let Some(n) = self.cfg.fault_after
            && st.history.len() >= n
        {
            return Err(HwError::Bus(format!(
                "simulated bus fault after {n} moves"
            )));
        }
        let resting = if position < st.commanded {
            (position + self.cfg.backlash).min(max)
        } else {
            position
        };
        st.commanded = position;
        st.resting = resting;
        st.history.push(position);
        if self.cfg.latency_frames == 0 {
            st.physical = resting;
            st.pending = 0;
        } else {
            st.pending = self.cfg.latency_frames;
        }
        Ok(())
    }

    /// Advance the motor by one frame interval.
    pub fn tick(&self) {
        let mut st = self.lock();
        if st.pending > 0 {
            st.pending -= 1;
            if st.pending == 0 {
                st.physical = st.resting;
            }
        }
    }

    /// Where the lens actually is.
    pub fn physical(&self) -> i32 {
        self.lock().physical
    }

    pub fn commanded(&self) -> i32 {
        self.lock().commanded
    }

    /// Every successfully commanded position, in order.
    pub fn history(&self) -> Vec<i32> {
        self.lock().history.clone()
    }

    pub fn moves(&self) -> usize {
        self.lock().history.len()
    }
}

/// `Focuser` over a `SimulatedLens`.
#[derive(Debug, Clone)]
pub struct SimulatedFocuser {
    lens: SimulatedLens,
}

impl SimulatedFocuser {
    pub fn new(lens: SimulatedLens) -> Self {
        Self { lens }
    }

    pub fn lens(&self) -> &SimulatedLens {
        &self.lens
    }
}

impl Focuser for SimulatedFocuser {
    fn get(&mut self) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.lens.physical())
    }

    fn set(
        &mut self,
        position: i32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::trace!(position, "simulated focus set");
        self.lens.command(position).map_err(Into::into)
    }

    fn range(&self) -> (i32, i32) {
        self.lens.cfg.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens(latency: u32, backlash: i32) -> SimulatedLens {
        SimulatedLens::new(SimLensCfg {
            range: (0, 1000),
            latency_frames: latency,
            backlash,
            fault_after: None,
        })
    }

    #[test]
    fn move_lands_after_latency() {
        let l = lens(2, 0);
        l.command(300).unwrap();
        assert_eq!(l.physical(), 0);
        l.tick();
        assert_eq!(l.physical(), 0);
        l.tick();
        assert_eq!(l.physical(), 300);
        assert_eq!(l.commanded(), 300);
    }

    #[test]
    fn zero_latency_is_immediate() {
        let l = lens(0, 0);
        l.command(42).unwrap();
        assert_eq!(l.physical(), 42);
    }

    #[test]
    fn downward_moves_leave_slack() {
        let l = lens(0, 12);
        l.command(500).unwrap();
        assert_eq!(l.physical(), 500);
        l.command(400).unwrap();
        assert_eq!(l.physical(), 412);
        l.command(450).unwrap();
        assert_eq!(l.physical(), 450);
    }

    #[test]
    fn out_of_range_is_rejected_without_moving() {
        let l = lens(0, 0);
        let err = l.command(1001).unwrap_err();
        assert!(matches!(err, HwError::OutOfRange { position: 1001, .. }));
        assert_eq!(l.moves(), 0);
    }

    #[test]
    fn fault_injection_after_n_moves() {
        let l = SimulatedLens::new(SimLensCfg {
            fault_after: Some(2),
            ..SimLensCfg::default()
        });
        let mut f = SimulatedFocuser::new(l.clone());
        f.set(10).unwrap();
        f.set(20).unwrap();
        let err = f.set(30).unwrap_err();
        assert!(err.to_string().contains("simulated bus fault"));
        assert_eq!(l.history(), vec![10, 20]);
    }
}
