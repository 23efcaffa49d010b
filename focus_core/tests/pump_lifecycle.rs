//! Frame pump thread lifecycle.
//!
//! Verifies that:
//! - The pump thread is joined when the pump is dropped
//! - Repeated pumps do not accumulate threads
//! - A busy consumer sees only the newest frame rather than a backlog

use std::time::{Duration, Instant};

use focus_core::mocks::NoFrames;
use focus_core::pump::FramePump;
use focus_hardware::{SceneCfg, SimLensCfg, SimulatedLens, SyntheticScene};
use focus_traits::clock::{ManualClock, MonotonicClock};
use focus_traits::{Frame, FrameSource};

fn scene() -> SyntheticScene {
    SyntheticScene::new(
        SimulatedLens::new(SimLensCfg::default()),
        SceneCfg {
            width: 32,
            height: 24,
            ..SceneCfg::default()
        },
    )
}

#[test]
fn paced_pump_delivers_frames_and_joins_on_drop() {
    let pump = FramePump::spawn_paced(scene(), 200, Duration::from_millis(50), MonotonicClock::new());
    let frame = pump
        .recv_timeout(Duration::from_secs(2))
        .expect("pump should deliver a frame");
    assert_eq!(frame.dimensions(), (32, 24));
    assert!(pump.delivered() >= 1);
    drop(pump);
}

#[test]
fn multiple_pumps_dont_leak_threads() {
    for _ in 0..10 {
        let pump =
            FramePump::spawn_paced(scene(), 500, Duration::from_millis(20), MonotonicClock::new());
        std::thread::sleep(Duration::from_millis(5));
        let _ = pump.latest();
        drop(pump);
    }
}

#[test]
fn event_pump_on_silent_source_exits_on_drop() {
    let pump = FramePump::spawn_event(NoFrames, Duration::from_millis(20), MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(50));
    assert!(pump.latest().is_none());
    assert_eq!(pump.delivered(), 0);
    assert!(pump.stalled_for_now() >= 40);
    drop(pump);
}

/// Yields `count` frames tagged with their index in the red channel, then
/// goes quiet.
struct Numbered {
    next: u8,
    count: u8,
}

impl FrameSource for Numbered {
    fn next_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error + Send + Sync>> {
        if self.next == self.count {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        let frame = Frame::from_pixel(8, 8, image::Rgb([self.next, 0, 0]));
        self.next += 1;
        Ok(Some(frame))
    }
}

#[test]
fn busy_consumer_gets_the_newest_frame_not_a_backlog() {
    let pump = FramePump::spawn_event(
        Numbered { next: 0, count: 5 },
        Duration::from_millis(10),
        MonotonicClock::new(),
    );
    // Never consume while the source produces; each new frame replaces the
    // unread one.
    let deadline = Instant::now() + Duration::from_secs(2);
    while pump.delivered() < 5 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(pump.delivered(), 5);
    assert_eq!(pump.dropped(), 4);

    let frame = pump.latest().expect("one frame pending");
    assert_eq!(frame.get_pixel(0, 0).0, [4, 0, 0]);
    assert!(pump.latest().is_none());
}

#[test]
fn stall_is_measured_from_last_frame() {
    let clock = ManualClock::new();
    let pump = FramePump::spawn_event(NoFrames, Duration::from_millis(5), clock);
    assert_eq!(pump.stalled_for(0), 0);
    assert_eq!(pump.stalled_for(250), 250);
}
