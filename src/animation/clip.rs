use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::pose::{interpolate_poses, Pose};

/// What happens when animation time leaves [0, duration]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeWrapMode {
    Clamp,
    Repeat,
    /// forward then backward, no jump at the loop seam
    #[default]
    PingPong,
}

impl TimeWrapMode {
    pub fn wrap(self, time: f32, duration: f32) -> f32 {
        if duration <= f32::EPSILON {
            return 0.0;
        }
        match self {
            TimeWrapMode::Clamp => time.clamp(0.0, duration),
            TimeWrapMode::Repeat => time.rem_euclid(duration),
            TimeWrapMode::PingPong => duration - (time.rem_euclid(2.0 * duration) - duration).abs(),
        }
    }
}

/// Keyframed clip: (timestamp, pose) pairs, sorted lazily before sampling
#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub name: String,
    keys: Vec<(f32, Pose)>,
    sorted: bool,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            sorted: true,
        }
    }

    pub fn add_key_pose(&mut self, pose: Pose, timestamp: f32) {
        if let Some((last, _)) = self.keys.last() {
            if *last > timestamp {
                self.sorted = false;
            }
        }
        self.keys.push((timestamp, pose));
    }

    /// Sorts keys by timestamp. Stable, so equal timestamps keep insertion order.
    pub fn normalize(&mut self) {
        if !self.sorted {
            self.keys.sort_by(|a, b| a.0.total_cmp(&b.0));
            self.sorted = true;
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.sorted = true;
    }

    pub fn key_times(&mut self) -> Vec<f32> {
        self.normalize();
        self.keys.iter().map(|(t, _)| *t).collect()
    }

    /// (first, last) key timestamps
    pub fn time_interval(&mut self) -> Option<(f32, f32)> {
        self.normalize();
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => Some((first.0, last.0)),
            _ => None,
        }
    }

    pub fn duration(&mut self) -> f32 {
        self.time_interval().map(|(_, end)| end).unwrap_or(0.0)
    }

    /// Bone count of the keyed poses, None for an empty clip
    pub fn bone_count(&self) -> Option<usize> {
        self.keys.first().map(|(_, pose)| pose.len())
    }

    /// Samples the clip with ping-pong looping
    pub fn get_pose(&mut self, time: f32) -> Result<Pose> {
        self.get_pose_wrapped(time, TimeWrapMode::PingPong)
    }

    pub fn get_pose_wrapped(&mut self, time: f32, mode: TimeWrapMode) -> Result<Pose> {
        self.normalize();
        let (first_time, duration) = self.time_interval().ok_or(EngineError::EmptyAnimation)?;
        let keys = &self.keys;
        let t = mode.wrap(time, duration);

        if t <= first_time {
            return Ok(keys[0].1.clone());
        }

        // first key strictly after t
        let next = keys.partition_point(|(kt, _)| *kt <= t);
        if next == 0 || next >= keys.len() {
            return Ok(keys[keys.len() - 1].1.clone());
        }
        let (t0, p0) = &keys[next - 1];
        let (t1, p1) = &keys[next];
        let (t0, t1) = (*t0, *t1);
        let alpha = if (t1 - t0).abs() < f32::EPSILON { 0.0 } else { (t - t0) / (t1 - t0) };
        Ok(interpolate_poses(p0, p1, alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::pose::{are_equal, interpolate_poses};
    use crate::math::Transform;
    use glam::{Quat, Vec3};
    use test_case::test_case;

    fn key(x: f32) -> Pose {
        vec![
            Transform::from_translation(Vec3::new(x, 0.0, 0.0)),
            Transform::from_rotation_translation(Quat::from_rotation_y(x), Vec3::Y),
        ]
    }

    fn two_key_clip(d: f32) -> Animation {
        let mut anim = Animation::new("walk");
        anim.add_key_pose(key(1.0), d);
        anim.add_key_pose(key(0.0), 0.0);
        anim
    }

    #[test]
    fn empty_clip_is_an_error() {
        let mut anim = Animation::new("empty");
        assert!(matches!(anim.get_pose(0.0), Err(EngineError::EmptyAnimation)));
    }

    #[test_case(0.0 ; "start")]
    #[test_case(1.0 ; "one")]
    #[test_case(1000.0 ; "far")]
    fn single_key_always_returns_that_pose(t: f32) {
        let mut anim = Animation::new("idle");
        anim.add_key_pose(key(0.4), 0.0);
        assert!(are_equal(&anim.get_pose(t).unwrap(), &key(0.4), 0.0));
    }

    #[test]
    fn single_late_key_is_returned_everywhere() {
        let mut anim = Animation::new("idle");
        anim.add_key_pose(key(0.4), 3.0);
        assert!(are_equal(&anim.get_pose(7.5).unwrap(), &key(0.4), 0.0));
    }

    #[test]
    fn keys_are_sorted_lazily() {
        let mut anim = two_key_clip(2.0);
        anim.add_key_pose(key(0.5), 1.0);
        assert_eq!(anim.key_times(), vec![0.0, 1.0, 2.0]);
        assert_eq!(anim.time_interval(), Some((0.0, 2.0)));
    }

    #[test]
    fn ping_pong_reflects_time() {
        let d = 2.0;
        let mut anim = two_key_clip(d);
        assert!(are_equal(&anim.get_pose(0.0).unwrap(), &key(0.0), 1e-5));
        assert!(are_equal(&anim.get_pose(2.0 * d).unwrap(), &key(0.0), 1e-5));
        assert!(are_equal(&anim.get_pose(d).unwrap(), &key(1.0), 1e-5));
        assert!(are_equal(&anim.get_pose(3.0 * d).unwrap(), &key(1.0), 1e-5));

        // past the end the clip plays backward
        let expected = interpolate_poses(&key(0.0), &key(1.0), 0.75);
        assert!(are_equal(&anim.get_pose(1.25 * d).unwrap(), &expected, 1e-5));
    }

    #[test]
    fn repeat_and_clamp_modes() {
        let d = 2.0;
        let mut anim = two_key_clip(d);
        let quarter = interpolate_poses(&key(0.0), &key(1.0), 0.25);
        let repeated = anim.get_pose_wrapped(1.25 * d, TimeWrapMode::Repeat).unwrap();
        assert!(are_equal(&repeated, &quarter, 1e-5));
        let clamped = anim.get_pose_wrapped(5.0 * d, TimeWrapMode::Clamp).unwrap();
        assert!(are_equal(&clamped, &key(1.0), 1e-5));
    }

    #[test]
    fn before_first_key_returns_first_pose() {
        let mut anim = Animation::new("late");
        anim.add_key_pose(key(0.2), 1.0);
        anim.add_key_pose(key(0.8), 2.0);
        assert!(are_equal(&anim.get_pose(0.5).unwrap(), &key(0.2), 0.0));
    }

    #[test]
    fn wrap_of_zero_duration_is_zero() {
        assert_eq!(TimeWrapMode::PingPong.wrap(12.0, 0.0), 0.0);
        assert_eq!(TimeWrapMode::Repeat.wrap(12.0, 0.0), 0.0);
    }
}
