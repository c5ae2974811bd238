//! Loop pacing.
//!
//! [`LoopClock`] brackets each run-loop iteration: `start()` records a
//! monotonic reference instant, `stop_and_sleep()` sleeps whatever is left
//! of the target interval and classifies how the iteration went. Overruns
//! never skip the sleep entirely; a short yield keeps a saturated loop from
//! pinning a core.

use std::time::{Duration, Instant};

use tokio::time;

use crate::error::DaemonError;

/// Sleep granted even when the iteration overran its interval.
const OVERRUN_YIELD: Duration = Duration::from_millis(2);

/// Fraction of the interval above which an iteration counts as tight.
const TIGHT_FRACTION: f64 = 0.9;

/// How an iteration fit into its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTiming {
    /// Work finished with room to spare; the remainder was slept.
    Slept { elapsed: Duration, slept: Duration },
    /// Work consumed more than 90% of the interval.
    Tight { elapsed: Duration },
    /// Work exceeded the interval; only the minimal yield was slept.
    Overrun { elapsed: Duration },
}

/// Monotonic stopwatch that paces the run loop to a fixed interval.
#[derive(Debug)]
pub struct LoopClock {
    interval: Duration,
    started: Option<Instant>,
}

impl LoopClock {
    /// Create a clock targeting the given interval per iteration.
    /// An interval of zero means "no sleep" beyond the overrun yield.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: None,
        }
    }

    /// The target interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record the reference instant for the current iteration.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop the stopwatch and sleep out the rest of the interval.
    ///
    /// Errors when called without a prior [`start`](Self::start); the
    /// supervisor treats that as fatal.
    pub async fn stop_and_sleep(&mut self) -> Result<LoopTiming, DaemonError> {
        let started = self.started.take().ok_or(DaemonError::ClockNotStarted)?;
        let elapsed = started.elapsed();

        if elapsed > self.interval {
            time::sleep(OVERRUN_YIELD).await;
            return Ok(LoopTiming::Overrun { elapsed });
        }

        let remaining = self.interval - elapsed;
        time::sleep(remaining).await;

        if !self.interval.is_zero()
            && elapsed.as_secs_f64() > self.interval.as_secs_f64() * TIGHT_FRACTION
        {
            return Ok(LoopTiming::Tight { elapsed });
        }

        Ok(LoopTiming::Slept {
            elapsed,
            slept: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_without_start_is_fatal() {
        let mut clock = LoopClock::new(Duration::from_millis(10));
        let err = clock.stop_and_sleep().await.unwrap_err();
        assert!(matches!(err, DaemonError::ClockNotStarted));
    }

    #[tokio::test]
    async fn test_sleeps_out_the_interval() {
        let mut clock = LoopClock::new(Duration::from_millis(50));
        let begin = Instant::now();

        clock.start();
        let timing = clock.stop_and_sleep().await.unwrap();

        assert!(matches!(timing, LoopTiming::Slept { .. }));
        let total = begin.elapsed();
        assert!(total >= Duration::from_millis(45), "slept only {:?}", total);
        assert!(total <= Duration::from_millis(150), "slept {:?}", total);
    }

    #[tokio::test]
    async fn test_overrun_still_yields() {
        let mut clock = LoopClock::new(Duration::from_millis(5));

        clock.start();
        std::thread::sleep(Duration::from_millis(20));
        let begin = Instant::now();
        let timing = clock.stop_and_sleep().await.unwrap();

        match timing {
            LoopTiming::Overrun { elapsed } => {
                assert!(elapsed >= Duration::from_millis(20));
            }
            other => panic!("expected overrun, got {:?}", other),
        }
        assert!(begin.elapsed() >= Duration::from_millis(2));
    }

    #[tokio::test]
    async fn test_zero_interval_always_overruns_quietly() {
        let mut clock = LoopClock::new(Duration::ZERO);

        clock.start();
        std::thread::sleep(Duration::from_millis(1));
        let timing = clock.stop_and_sleep().await.unwrap();
        assert!(matches!(timing, LoopTiming::Overrun { .. }));
    }

    #[tokio::test]
    async fn test_tight_band() {
        let mut clock = LoopClock::new(Duration::from_millis(100));

        clock.start();
        std::thread::sleep(Duration::from_millis(95));
        let timing = clock.stop_and_sleep().await.unwrap();
        // 95ms of a 100ms interval is inside the warning band but not over.
        assert!(
            matches!(timing, LoopTiming::Tight { .. } | LoopTiming::Overrun { .. }),
            "got {:?}",
            timing
        );
    }

    #[tokio::test]
    async fn test_start_is_reusable() {
        let mut clock = LoopClock::new(Duration::from_millis(1));
        for _ in 0..3 {
            clock.start();
            clock.stop_and_sleep().await.unwrap();
        }
    }
}
