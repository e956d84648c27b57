use std::time::Instant;

/// Locally measured frame rate, independent of the fps the backend reports.
///
/// Keeps an exponential moving average of frame inter-arrival times. Gaps
/// longer than `max_gap_secs` (a stalled stream) restart the average instead
/// of dragging it toward zero for a long time.
pub struct FrameRateMeter {
    last_arrival: Option<Instant>,
    /// EMA of seconds between frames.
    avg_interval: f64,
    /// EMA smoothing factor (0..1).
    alpha: f64,
    max_gap_secs: f64,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self {
            last_arrival: None,
            avg_interval: 0.0,
            alpha: 0.2,
            max_gap_secs: 5.0,
        }
    }

    pub fn record(&mut self, at: Instant) {
        if let Some(prev) = self.last_arrival {
            let gap = at.saturating_duration_since(prev).as_secs_f64();
            if gap > self.max_gap_secs {
                self.avg_interval = 0.0;
            } else if self.avg_interval == 0.0 {
                self.avg_interval = gap;
            } else {
                self.avg_interval = self.alpha * gap + (1.0 - self.alpha) * self.avg_interval;
            }
        }
        self.last_arrival = Some(at);
    }

    /// Frames per second, 0 until two frames have arrived.
    pub fn fps(&self) -> f64 {
        if self.avg_interval > 0.0 {
            1.0 / self.avg_interval
        } else {
            0.0
        }
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_until_second_frame() {
        let mut meter = FrameRateMeter::new();
        assert_eq!(meter.fps(), 0.0);
        meter.record(Instant::now());
        assert_eq!(meter.fps(), 0.0);
    }

    #[test]
    fn steady_stream_converges() {
        let mut meter = FrameRateMeter::new();
        let start = Instant::now();
        for i in 0..50 {
            meter.record(start + Duration::from_millis(100 * i));
        }
        assert!((meter.fps() - 10.0).abs() < 0.01, "fps = {}", meter.fps());
    }

    #[test]
    fn long_stall_restarts_average() {
        let mut meter = FrameRateMeter::new();
        let start = Instant::now();
        for i in 0..10 {
            meter.record(start + Duration::from_millis(40 * i));
        }
        let resumed = start + Duration::from_secs(60);
        meter.record(resumed);
        assert_eq!(meter.fps(), 0.0);
        meter.record(resumed + Duration::from_millis(500));
        assert!((meter.fps() - 2.0).abs() < 0.5, "fps = {}", meter.fps());
    }
}
