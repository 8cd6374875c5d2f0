//! Sliding-window error-rate/latency tracking (§4.7): "track error rate and
//! p95 latency over a sliding window. If error rate > 2% for >= 2 minutes,
//! abort rollout and invoke rollback." Samples land in a fixed-size ring
//! buffer on a `tokio::time::interval`, the same shape as the controller's
//! periodic health-check loop, generalized to keep enough history to judge
//! a multi-minute sustained threshold rather than a single instant.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub at: Instant,
    pub success: bool,
    pub latency_ms: f64,
}

/// Sustained-threshold rollback rule: error rate over the window must
/// exceed `ERROR_RATE_THRESHOLD` for at least `SUSTAINED_FOR` before
/// `should_roll_back` fires, so a single bad second doesn't trigger a
/// rollback.
pub struct SlidingWindow {
    window: Duration,
    samples: VecDeque<Sample>,
    breach_started_at: Option<Instant>,
}

impl SlidingWindow {
    pub const ERROR_RATE_THRESHOLD: f64 = 0.02;
    pub const SUSTAINED_FOR: Duration = Duration::from_secs(120);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            breach_started_at: None,
        }
    }

    pub fn record(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        self.evict_stale(sample.at);
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let errors = self.samples.iter().filter(|s| !s.success).count();
        errors as f64 / self.samples.len() as f64
    }

    pub fn p95_latency_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut latencies: Vec<f64> = self.samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((latencies.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.min(latencies.len()).saturating_sub(1);
        Some(latencies[idx])
    }

    /// Call once per tick with the current time. Returns `true` the moment
    /// the error rate has been above threshold continuously for
    /// `SUSTAINED_FOR`.
    pub fn should_roll_back(&mut self, now: Instant) -> bool {
        if self.error_rate() > Self::ERROR_RATE_THRESHOLD {
            let started = *self.breach_started_at.get_or_insert(now);
            now.duration_since(started) >= Self::SUSTAINED_FOR
        } else {
            self.breach_started_at = None;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(at: Instant, success: bool) -> Sample {
        Sample {
            at,
            success,
            latency_ms: 10.0,
        }
    }

    #[test]
    fn healthy_window_never_triggers_rollback() {
        let mut window = SlidingWindow::new(Duration::from_secs(300));
        let mut t = Instant::now();
        for _ in 0..100 {
            window.record(sample_at(t, true));
            t += Duration::from_secs(1);
            assert!(!window.should_roll_back(t));
        }
    }

    #[test]
    fn brief_error_spike_does_not_trigger_rollback() {
        let mut window = SlidingWindow::new(Duration::from_secs(300));
        let mut t = Instant::now();
        for _ in 0..10 {
            window.record(sample_at(t, false));
            t += Duration::from_secs(1);
        }
        assert!(!window.should_roll_back(t));
    }

    #[test]
    fn sustained_error_rate_above_threshold_triggers_rollback_after_two_minutes() {
        let mut window = SlidingWindow::new(Duration::from_secs(300));
        let mut t = Instant::now();
        let mut triggered = false;
        for _ in 0..200 {
            window.record(sample_at(t, false));
            t += Duration::from_secs(1);
            if window.should_roll_back(t) {
                triggered = true;
                break;
            }
        }
        assert!(triggered);
    }

    #[test]
    fn recovery_resets_the_breach_timer() {
        let mut window = SlidingWindow::new(Duration::from_secs(300));
        let mut t = Instant::now();
        for _ in 0..90 {
            window.record(sample_at(t, false));
            t += Duration::from_secs(1);
            window.should_roll_back(t);
        }
        // recover: flood with successes so the error rate drops under threshold
        for _ in 0..1000 {
            window.record(sample_at(t, true));
            t += Duration::from_millis(10);
        }
        assert!(!window.should_roll_back(t));
    }

    #[test]
    fn p95_latency_reported() {
        let mut window = SlidingWindow::new(Duration::from_secs(300));
        let t = Instant::now();
        for i in 0..100 {
            window.record(Sample {
                at: t,
                success: true,
                latency_ms: i as f64,
            });
        }
        let p95 = window.p95_latency_ms().unwrap();
        assert!(p95 >= 90.0 && p95 <= 99.0);
    }
}
