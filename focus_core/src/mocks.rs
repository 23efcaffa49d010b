//! Test and helper mocks for focus_core

use std::time::Duration;

use focus_traits::{Focuser, Frame, FrameSource};

/// A frame source that never produces a frame; each call waits out its timeout.
pub struct NoFrames;

impl FrameSource for NoFrames {
    fn next_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error + Send + Sync>> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

/// In-memory focuser that records every commanded position.
///
/// Useful when driving the controller with `step_from_score`.
#[derive(Debug, Clone)]
pub struct RecordingFocuser {
    pub range: (i32, i32),
    pub position: i32,
    pub history: Vec<i32>,
    /// Fail every `set` once this many have succeeded.
    pub fail_after: Option<usize>,
}

impl RecordingFocuser {
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            range: (min, max),
            position: min,
            history: Vec::new(),
            fail_after: None,
        }
    }
}

impl Focuser for RecordingFocuser {
    fn get(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.position)
    }

    fn set(&mut self, position: i32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_after.is_some_and(|n| self.history.len() >= n) {
            return Err(Box::new(std::io::Error::other("recording focuser: bus nack")));
        }
        self.position = position;
        self.history.push(position);
        Ok(())
    }

    fn range(&self) -> (i32, i32) {
        self.range
    }
}
