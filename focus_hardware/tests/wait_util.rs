use std::cell::Cell;
use std::time::{Duration, Instant};

use focus_hardware::error::HwError;
use focus_hardware::util::wait_until_idle;
use rstest::rstest;

/// Busy register that clears after `polls` reads.
fn clears_after(polls: u32) -> impl FnMut() -> Result<bool, HwError> {
    let seen = Cell::new(0u32);
    move || {
        seen.set(seen.get() + 1);
        Ok(seen.get() <= polls)
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(5)]
fn returns_once_the_controller_goes_idle(#[case] polls: u32) {
    let res = wait_until_idle(
        clears_after(polls),
        Duration::from_millis(500),
        Duration::from_micros(100),
    );
    assert!(res.is_ok(), "expected idle, got {res:?}");
}

#[test]
fn stuck_busy_line_times_out_without_spinning_forever() {
    let started = Instant::now();
    let err = wait_until_idle(|| Ok(true), Duration::from_millis(5), Duration::from_micros(200))
        .expect_err("expected timeout error");
    assert!(matches!(err, HwError::BusyTimeout), "{err:?}");
    assert!(started.elapsed() >= Duration::from_millis(5));
    assert!(err.to_string().contains("busy timeout"));
}

#[test]
fn probe_errors_surface_unchanged() {
    let err = wait_until_idle(
        || Err(HwError::Bus("nack".into())),
        Duration::from_millis(50),
        Duration::from_micros(200),
    )
    .expect_err("probe error should surface");
    assert!(matches!(err, HwError::Bus(ref s) if s == "nack"));
}
