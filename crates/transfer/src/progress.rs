use std::time::Duration;

use tokio::time::Instant;

/// Minimum time between two speed recomputations.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Speed reported before the first full sample interval has elapsed.
const INITIAL_SPEED: &str = "0 B/s";

const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

/// Formats a byte rate with two decimals, scaling up to GB/s.
pub fn format_speed(bytes_per_second: f64) -> String {
    let mut speed = bytes_per_second;
    let mut unit = 0;
    while speed >= 1024.0 && unit < UNITS.len() - 1 {
        speed /= 1024.0;
        unit += 1;
    }
    format!("{speed:.2} {}", UNITS[unit])
}

// ---------------------------------------------------------------------------
// SpeedTracker
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Turns a stream of cumulative byte counts into a formatted transfer speed.
///
/// The last sample is replaced at most once per second; calls in between
/// return the previously computed value unchanged.
pub struct SpeedTracker {
    last: SpeedSample,
    current: String,
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedTracker {
    /// Creates a tracker whose first sample is (now, 0 bytes).
    pub fn new() -> Self {
        Self::with_baseline(0)
    }

    /// Creates a tracker whose first sample is (now, `bytes`).
    ///
    /// Resumed uploads start counting at the resume offset; seeding the
    /// baseline keeps those bytes out of the first rate.
    pub fn with_baseline(bytes: u64) -> Self {
        Self {
            last: SpeedSample {
                bytes,
                timestamp: Instant::now(),
            },
            current: INITIAL_SPEED.to_string(),
        }
    }

    /// Records `cumulative_bytes` at the current instant and returns the speed.
    pub fn observe(&mut self, cumulative_bytes: u64) -> &str {
        self.observe_at(cumulative_bytes, Instant::now())
    }

    /// Records `cumulative_bytes` at `now` and returns the speed.
    ///
    /// `cumulative_bytes` must not be lower than any previously observed value.
    pub fn observe_at(&mut self, cumulative_bytes: u64, now: Instant) -> &str {
        let elapsed = now.saturating_duration_since(self.last.timestamp);
        if elapsed < SAMPLE_INTERVAL {
            return &self.current;
        }

        let delta = cumulative_bytes.saturating_sub(self.last.bytes);
        self.current = format_speed(delta as f64 / elapsed.as_secs_f64());
        self.last = SpeedSample {
            bytes: cumulative_bytes,
            timestamp: now,
        };
        &self.current
    }

    /// Returns the last computed speed without sampling.
    pub fn current(&self) -> &str {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_plain_bytes() {
        assert_eq!(format_speed(500.0), "500.00 B/s");
        assert_eq!(format_speed(0.0), "0.00 B/s");
    }

    #[test]
    fn format_kilobytes() {
        assert_eq!(format_speed(1536.0), "1.50 KB/s");
        assert_eq!(format_speed(1024.0), "1.00 KB/s");
    }

    #[test]
    fn format_megabytes() {
        assert_eq!(format_speed(1_048_576.0 * 2.5), "2.50 MB/s");
    }

    #[test]
    fn format_caps_at_gigabytes() {
        let gib = 1024.0_f64.powi(3);
        assert_eq!(format_speed(gib), "1.00 GB/s");
        assert_eq!(format_speed(gib * 4096.0), "4096.00 GB/s");
    }

    #[tokio::test(start_paused = true)]
    async fn new_tracker_reports_zero() {
        let tracker = SpeedTracker::new();
        assert_eq!(tracker.current(), "0 B/s");
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_samples_are_ignored() {
        let mut tracker = SpeedTracker::new();
        let start = Instant::now();

        for (bytes, ms) in [(10_000u64, 100u64), (20_000, 300), (30_000, 650), (40_000, 999)] {
            let speed = tracker.observe_at(bytes, start + Duration::from_millis(ms));
            assert_eq!(speed, "0 B/s");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recomputes_after_one_second() {
        let mut tracker = SpeedTracker::new();
        let start = Instant::now();

        let speed = tracker.observe_at(2048, start + Duration::from_secs(1)).to_string();
        assert_eq!(speed, "2.00 KB/s");

        // Within the next second the value stays put.
        let same = tracker.observe_at(900_000, start + Duration::from_millis(1500));
        assert_eq!(same, "2.00 KB/s");

        // Two seconds after the last replacement: (2048 + 4096 - 2048) / 2 s.
        let next = tracker.observe_at(2048 + 4096, start + Duration::from_secs(3));
        assert_eq!(next, "2.00 KB/s");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_uses_delta_since_last_sample() {
        let mut tracker = SpeedTracker::new();
        let start = Instant::now();

        tracker.observe_at(1_048_576, start + Duration::from_secs(1));
        let speed = tracker.observe_at(1_048_576 + 512, start + Duration::from_secs(2));
        assert_eq!(speed, "512.00 B/s");
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_excludes_resumed_bytes() {
        let mut tracker = SpeedTracker::with_baseline(400_000);
        let start = Instant::now();

        let speed = tracker.observe_at(400_000 + 1536, start + Duration::from_secs(1));
        assert_eq!(speed, "1.50 KB/s");
    }

    #[tokio::test(start_paused = true)]
    async fn observe_uses_tokio_clock() {
        let mut tracker = SpeedTracker::new();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(tracker.observe(500), "0 B/s");

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(tracker.observe(1000), "1000.00 B/s");
    }
}
