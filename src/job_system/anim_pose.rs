use std::sync::{Arc, Mutex, PoisonError};

use log::trace;

use crate::config::EngineConfig;
use crate::entity::SkinnedEntity;
use crate::error::Result;

use super::task_queue::Task;

/// Advances one entity by a frame: sample its clip, pose the skeleton, skin the mesh
pub struct AnimPoseTask {
    name: String,
    entity: Arc<Mutex<SkinnedEntity>>,
    dt: f32,
    config: Arc<EngineConfig>,
}

impl AnimPoseTask {
    pub fn new(entity: Arc<Mutex<SkinnedEntity>>, dt: f32, config: Arc<EngineConfig>) -> Self {
        let name = {
            let entity = entity.lock().unwrap_or_else(PoisonError::into_inner);
            format!("AnimatorTask_{}", entity.name)
        };
        Self { name, entity, dt, config }
    }
}

impl Task for AnimPoseTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self) -> Result<()> {
        // the entity is left untouched by a failed frame, so a poisoned lock is still usable
        let mut entity = self.entity.lock().unwrap_or_else(PoisonError::into_inner);
        let skinned = entity.advance(self.dt, &self.config)?;
        trace!("{}: skinned = {}", self.name, skinned);
        Ok(())
    }
}
