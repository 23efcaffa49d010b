//! Background frame delivery.
//!
//! A `FramePump` owns the `FrameSource` on its own thread and hands the newest
//! frame to the consumer through a one-slot channel. If the consumer has not
//! taken the pending frame yet, the pump discards it and puts the fresh one in
//! its place, so the consumer never works through a backlog of stale frames.
//! Paced and event-driven variants are provided; the thread is joined when the
//! pump is dropped.
use crossbeam_channel as xch;
use focus_traits::clock::Clock;
use focus_traits::{Frame, FrameSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared with the pump thread.
#[derive(Debug, Default)]
struct Counters {
    /// Milliseconds since the pump epoch at which the last frame arrived.
    last_frame_ms: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    source_errors: AtomicU64,
}

pub struct FramePump {
    rx: xch::Receiver<Frame>,
    counters: Arc<Counters>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl FramePump {
    /// Pull frames at `fps`, waiting up to `timeout` for each.
    pub fn spawn_paced<S, C>(source: S, fps: u32, timeout: Duration, clock: C) -> Self
    where
        S: FrameSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let period = Duration::from_micros(crate::util::period_us(fps));
        Self::spawn_inner(source, timeout, Some(period), clock, "paced")
    }

    /// Event-driven pump: rely on the source blocking until a frame is ready
    /// and do not add extra sleeps.
    pub fn spawn_event<S, C>(source: S, timeout: Duration, clock: C) -> Self
    where
        S: FrameSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        Self::spawn_inner(source, timeout, None, clock, "event")
    }

    fn spawn_inner<S, C>(
        mut source: S,
        timeout: Duration,
        period: Option<Duration>,
        clock: C,
        kind: &'static str,
    ) -> Self
    where
        S: FrameSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let stale = rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let counters = Arc::new(Counters::default());
        let counters_clone = counters.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            'pump: loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!(kind, "frame pump received shutdown signal");
                    break;
                }

                match source.next_frame(timeout) {
                    Ok(Some(frame)) => {
                        counters_clone
                            .last_frame_ms
                            .store(clock.ms_since(epoch), Ordering::Relaxed);
                        let mut frame = frame;
                        loop {
                            match tx.try_send(frame) {
                                Ok(()) => {
                                    counters_clone.delivered.fetch_add(1, Ordering::Relaxed);
                                    break;
                                }
                                Err(xch::TrySendError::Full(back)) => {
                                    // Swap out the unread frame; if the consumer
                                    // took it meanwhile the slot is already free.
                                    if stale.try_recv().is_ok() {
                                        counters_clone.dropped.fetch_add(1, Ordering::Relaxed);
                                    }
                                    frame = back;
                                }
                                Err(xch::TrySendError::Disconnected(_)) => {
                                    tracing::debug!(kind, "frame consumer disconnected, exiting pump");
                                    break 'pump;
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // The consumer's stall watchdog decides when this becomes fatal.
                        counters_clone.source_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(kind, error = %e, "frame source error");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(period) = period {
                    clock.sleep(period);
                }
            }
            tracing::trace!(kind, "frame pump thread exiting cleanly");
        });

        Self {
            rx,
            counters,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Newest pending frame, if any. Never blocks.
    pub fn latest(&self) -> Option<Frame> {
        self.rx.try_iter().last()
    }

    /// Wait up to `timeout` for a frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Milliseconds between the last frame and `now_ms` (relative to `epoch()`).
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.counters.last_frame_ms.load(Ordering::Relaxed))
    }

    /// Convenience helper: stall measured against a real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        self.stalled_for(ms.min(u128::from(u64::MAX)) as u64)
    }

    /// Frames put into the channel, including ones later replaced unread.
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Frames replaced by a newer one before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn source_errors(&self) -> u64 {
        self.counters.source_errors.load(Ordering::Relaxed)
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits between frames, or once the in-flight
        // `next_frame(timeout)` returns.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("frame pump thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "frame pump thread panicked during shutdown");
                }
            }
        }
    }
}
