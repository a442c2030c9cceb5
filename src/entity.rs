use log::{debug, trace};

use crate::animation::{Animation, Animator, SpaceType};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::skinning::{self, NormalSkinning, SkinningFrameData, SkinningMethod, SkinningRefData};

/// A skinned mesh with its animations. Owns its bind-time and per-frame data
/// exclusively; only the entity's own task touches it during a frame.
#[derive(Debug)]
pub struct SkinnedEntity {
    pub name: String,
    clips: Vec<Animation>,
    pub animator: Animator,
    method: SkinningMethod,
    pub normals: NormalSkinning,
    ref_data: SkinningRefData,
    frame: SkinningFrameData,
    force_update: bool,
}

impl SkinnedEntity {
    pub fn new(
        name: impl Into<String>,
        ref_data: SkinningRefData,
        clips: Vec<Animation>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let bones = ref_data.skeleton.size();
        for clip in &clips {
            match clip.bone_count() {
                None => return Err(EngineError::EmptyAnimation),
                Some(n) if n != bones => {
                    return Err(EngineError::PoseSizeMismatch { expected: bones, actual: n });
                }
                Some(_) => {}
            }
        }
        let frame = SkinningFrameData::new(&ref_data);
        Ok(Self {
            name: name.into(),
            clips,
            animator: Animator::default(),
            method: config.default_skinning,
            normals: config.normal_skinning,
            ref_data,
            frame,
            force_update: true,
        })
    }

    pub fn ref_data(&self) -> &SkinningRefData {
        &self.ref_data
    }

    pub fn frame(&self) -> &SkinningFrameData {
        &self.frame
    }

    pub fn clips(&self) -> &[Animation] {
        &self.clips
    }

    pub fn method(&self) -> SkinningMethod {
        self.method
    }

    pub fn has_animation(&self) -> bool {
        !self.clips.is_empty()
    }

    /// True if the next frame must run even when playback is paused
    pub fn needs_update(&self) -> bool {
        self.force_update || self.frame.do_reset
    }

    pub fn set_skinning_method(&mut self, method: SkinningMethod) {
        if method != self.method {
            debug!("{}: skinning method {:?} -> {:?}", self.name, self.method, method);
            self.method = method;
            self.force_update = true;
        }
    }

    pub fn set_animation(&mut self, index: usize) -> Result<()> {
        if index >= self.clips.len() {
            return Err(EngineError::InvalidAnimation {
                index,
                len: self.clips.len(),
            });
        }
        if index != self.animator.clip_idx {
            self.animator.clip_idx = index;
            self.force_update = true;
        }
        Ok(())
    }

    /// Snaps back to the bind pose on the next frame
    pub fn request_reset(&mut self) {
        self.frame.do_reset = true;
    }

    /// Sample, pose and skin for one frame. Returns true if new buffers were committed.
    /// On error the frame data is left as it was.
    pub fn advance(&mut self, dt: f32, config: &EngineConfig) -> Result<bool> {
        let resetting = self.frame.do_reset;
        if resetting {
            self.animator.reset();
            self.frame.reset(&self.ref_data);
            self.force_update = true;
        }
        if !self.ref_data.weights_valid {
            return Err(EngineError::InvalidWeights(format!(
                "entity '{}' cannot be skinned",
                self.name
            )));
        }

        let applied = self.animator.advance(dt, config.max_frame_dt, config.slow_motion_factor);
        let saved_local = self.frame.skeleton.pose(SpaceType::Local).clone();
        // a reset shows the bind pose until time moves again
        let sample = applied != 0.0 || (self.force_update && !resetting);
        if sample && self.has_animation() {
            let time_wrap = self.animator.time_wrap;
            let time = self.animator.time();
            let (index, len) = (self.animator.clip_idx, self.clips.len());
            let clip = self
                .clips
                .get_mut(index)
                .ok_or(EngineError::InvalidAnimation { index, len })?;
            let pose = clip.get_pose_wrapped(time, time_wrap)?;
            self.frame.skeleton.set_pose(&pose, SpaceType::Local);
        }

        if !(self.force_update || self.frame.pose_changed()) {
            trace!("{}: pose unchanged, skinning skipped", self.name);
            return Ok(false);
        }

        self.ref_data.prepare(self.method, config);
        self.frame.do_skinning = true;
        match skinning::skin(self.method, self.normals, &self.ref_data, &self.frame.skeleton) {
            Ok(deformed) => {
                self.frame.commit(deformed);
                self.force_update = false;
                Ok(true)
            }
            Err(err) => {
                self.frame.skeleton.set_pose(&saved_local, SpaceType::Local);
                self.frame.do_skinning = false;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Skeleton;
    use crate::math::{approx_eq_vec3, Transform};
    use crate::skinning::{TriangleMesh, WeightMatrix};
    use glam::Vec3;

    fn chain_entity(weights: WeightMatrix) -> SkinnedEntity {
        let mut skeleton = Skeleton::new();
        let root = skeleton.add_bone(None, Transform::IDENTITY, SpaceType::Local, "root").unwrap();
        skeleton
            .add_bone(Some(root), Transform::from_translation(Vec3::X), SpaceType::Local, "child")
            .unwrap();
        let mesh = TriangleMesh {
            vertices: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)],
            normals: vec![Vec3::Y; 2],
            ..Default::default()
        };
        let config = EngineConfig::default();
        let ref_data = SkinningRefData::new(mesh, skeleton.clone(), weights, None, Transform::IDENTITY, &config).unwrap();

        let mut clip = Animation::new("slide");
        let rest = skeleton.pose(SpaceType::Local).clone();
        let mut moved = rest.clone();
        moved[1] = Transform::from_translation(Vec3::new(2.0, 0.0, 0.0));
        clip.add_key_pose(rest, 0.0);
        clip.add_key_pose(moved, 1.0);
        SkinnedEntity::new("chain", ref_data, vec![clip], &config).unwrap()
    }

    fn rigid_weights() -> WeightMatrix {
        WeightMatrix::from_triplets(2, 2, vec![(0, 1, 1.0), (1, 0, 1.0)]).unwrap()
    }

    #[test]
    fn advance_skins_sampled_pose() {
        let mut entity = chain_entity(rigid_weights());
        let config = EngineConfig::default();
        assert!(entity.advance(0.0, &config).unwrap());
        assert_eq!(entity.frame().frame_counter, 1);

        assert!(entity.advance(0.5, &config).unwrap());
        let mesh = &entity.frame().current;
        assert!(approx_eq_vec3(mesh.positions[0], Vec3::new(1.5, 0.0, 0.0), 1e-5));
        assert!(approx_eq_vec3(mesh.positions[1], Vec3::new(0.5, 0.0, 0.0), 1e-5));
        assert!(approx_eq_vec3(entity.frame().previous.positions[0], Vec3::X, 1e-5));
    }

    #[test]
    fn unchanged_pose_is_not_reskinned() {
        let mut entity = chain_entity(rigid_weights());
        let config = EngineConfig::default();
        entity.advance(0.0, &config).unwrap();
        assert!(!entity.advance(0.0, &config).unwrap());
        assert_eq!(entity.frame().frame_counter, 1);
    }

    #[test]
    fn reset_returns_to_bind_pose() {
        let mut entity = chain_entity(rigid_weights());
        let config = EngineConfig::default();
        entity.advance(0.4, &config).unwrap();
        entity.request_reset();
        assert!(entity.needs_update());
        assert!(entity.advance(0.0, &config).unwrap());
        assert_eq!(entity.animator.time(), 0.0);
        assert!(approx_eq_vec3(entity.frame().current.positions[0], Vec3::X, 1e-5));
    }

    #[test]
    fn invalid_weights_keep_previous_buffers() {
        let weights = WeightMatrix::from_triplets(2, 2, vec![(0, 1, 1.0)]).unwrap();
        let mut entity = chain_entity(weights);
        let before = entity.frame().current.clone();
        let err = entity.advance(0.1, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights(_)));
        assert_eq!(entity.frame().frame_counter, 0);
        assert_eq!(*entity.frame().current, *before);
    }

    #[test]
    fn animation_index_is_checked() {
        let mut entity = chain_entity(rigid_weights());
        assert!(entity.set_animation(0).is_ok());
        assert!(matches!(
            entity.set_animation(3),
            Err(EngineError::InvalidAnimation { index: 3, len: 1 })
        ));
    }

    #[test]
    fn method_switch_forces_update() {
        let mut entity = chain_entity(rigid_weights());
        let config = EngineConfig::default();
        entity.advance(0.0, &config).unwrap();
        entity.set_skinning_method(SkinningMethod::Dqs);
        assert!(entity.needs_update());
        assert!(entity.advance(0.0, &config).unwrap());
        assert_eq!(entity.method(), SkinningMethod::Dqs);
    }

    #[test]
    fn reset_shows_bind_pose_when_clip_starts_elsewhere() {
        let mut entity = chain_entity(rigid_weights());
        let rest = entity.ref_data().skeleton.pose(SpaceType::Local).clone();
        let mut clip = Animation::new("offset");
        for (time, x) in [(0.0, 2.0), (1.0, 3.0)] {
            let mut pose = rest.clone();
            pose[1] = Transform::from_translation(Vec3::new(x, 0.0, 0.0));
            clip.add_key_pose(pose, time);
        }
        entity.clips = vec![clip];
        let config = EngineConfig::default();

        entity.advance(0.3, &config).unwrap();
        assert!(approx_eq_vec3(entity.frame().current.positions[0], Vec3::new(2.3, 0.0, 0.0), 1e-5));

        entity.request_reset();
        assert!(entity.advance(0.0, &config).unwrap());
        assert!(approx_eq_vec3(entity.frame().current.positions[0], Vec3::X, 1e-5));
        assert!(!entity.advance(0.0, &config).unwrap());

        entity.advance(0.25, &config).unwrap();
        assert!(approx_eq_vec3(entity.frame().current.positions[0], Vec3::new(2.25, 0.0, 0.0), 1e-5));
    }
}
