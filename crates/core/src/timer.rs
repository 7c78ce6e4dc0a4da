//! Frame clock for animation and frame-rate reporting.

use std::time::{Duration, Instant};

/// How often [`FrameClock::tick`] reports a frame-rate sample.
pub const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Monotonic clock driving the animation loop.
///
/// `tick` returns the delta since the previous tick and, roughly once per
/// [`FPS_REPORT_INTERVAL`], the average frame rate over that window.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
}

/// Result of one [`FrameClock::tick`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// Seconds since the previous tick.
    pub delta_secs: f32,
    /// Average frames per second, present once per report interval.
    pub fps: Option<f32>,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Seconds since the clock was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Advances the clock by one frame.
    pub fn tick(&mut self) -> Tick {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Tick {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.window_frames += 1;

        let window = now.saturating_duration_since(self.window_start);
        let fps = if window >= FPS_REPORT_INTERVAL {
            let fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_start = now;
            self.window_frames = 0;
            Some(fps)
        } else {
            None
        };

        Tick {
            delta_secs: delta.as_secs_f32(),
            fps,
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_reports_delta() {
        let mut clock = FrameClock::new();
        let start = clock.last_tick;
        let tick = clock.tick_at(start + Duration::from_millis(16));
        assert!((tick.delta_secs - 0.016).abs() < 1e-4);
        assert!(tick.fps.is_none());
    }

    #[test]
    fn test_fps_reported_once_per_interval() {
        let mut clock = FrameClock::new();
        let start = clock.last_tick;
        for i in 1..60 {
            let tick = clock.tick_at(start + Duration::from_millis(i * 10));
            assert!(tick.fps.is_none());
        }
        let tick = clock.tick_at(start + Duration::from_millis(1000));
        let fps = tick.fps.unwrap();
        assert!((fps - 60.0).abs() < 0.5);

        let tick = clock.tick_at(start + Duration::from_millis(1010));
        assert!(tick.fps.is_none());
    }
}
