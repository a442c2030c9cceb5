use super::clip::TimeWrapMode;

/// Per-entity playback state
#[derive(Clone, Debug)]
pub struct Animator {
    pub clip_idx: usize,
    pub time_wrap: TimeWrapMode,
    pub speed: f32,
    pub slow_motion: bool,
    /// seconds since the clip started
    time: f32,
}

impl Default for Animator {
    fn default() -> Self {
        Self {
            clip_idx: 0,
            time_wrap: TimeWrapMode::PingPong,
            speed: 1.0,
            slow_motion: false,
            time: 0.0,
        }
    }
}

impl Animator {
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }

    /// Scales the frame delta by speed and slow motion and advances the clock.
    /// Deltas above `max_dt` come from stalls (loading, debugger) and are dropped.
    /// Returns the delta that was applied.
    pub fn advance(&mut self, dt: f32, max_dt: f32, slow_motion_factor: f32) -> f32 {
        if dt > max_dt || !dt.is_finite() {
            return 0.0;
        }
        let factor = if self.slow_motion { slow_motion_factor } else { 1.0 } * self.speed;
        let dt = dt * factor;
        self.time += dt;
        dt
    }
}
