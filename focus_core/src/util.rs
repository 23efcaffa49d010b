//! Frame period helpers.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Frame period in microseconds for `fps`.
/// - Clamps `fps` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(fps: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(fps.max(1))).max(1)
}

/// Frame period in milliseconds for `fps`, at least 1.
#[inline]
pub fn period_ms(fps: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(fps.max(1))).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1_000_000, 1000)]
    #[case(1, 1_000_000, 1000)]
    #[case(30, 33_333, 33)]
    #[case(2000, 500, 1)]
    fn periods(#[case] fps: u32, #[case] us: u64, #[case] ms: u64) {
        assert_eq!(period_us(fps), us);
        assert_eq!(period_ms(fps), ms);
    }
}
