pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A single video frame: packed 8-bit RGB, row-major, no padding.
pub type Frame = image::RgbImage;

/// Motorized lens focus actuator.
///
/// Positions are integer setpoints inside the inclusive `range()`. `set` may
/// return before the motor has physically arrived; callers absorb that latency
/// themselves.
pub trait Focuser {
    /// Current commanded or sensed position. Telemetry only.
    fn get(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
    fn set(&mut self, position: i32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Inclusive `(min, max)` limits of the actuator.
    fn range(&self) -> (i32, i32);
}

impl<F: Focuser + ?Sized> Focuser for Box<F> {
    fn get(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).get()
    }
    fn set(&mut self, position: i32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set(position)
    }
    fn range(&self) -> (i32, i32) {
        (**self).range()
    }
}

/// Supplier of video frames.
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame. `Ok(None)` means no frame was
    /// available this tick.
    fn next_frame(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error + Send + Sync>>;
}
