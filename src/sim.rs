use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crossbeam_queue::SegQueue;
use generational_arena::{Arena, Index};
use log::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::entity::SkinnedEntity;
use crate::error::{EngineError, Result};
use crate::job_system::{AnimPoseTask, TaskQueue};
use crate::skinning::SkinningMethod;
use crate::snapshot_handoff::{EntitySnapshot, RenderSnapshot, SnapshotGuard, SnapshotHandoff};

pub type EntityId = Index;

/// Playback controls, applied at the start of the next frame
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    SetPlaying(bool),
    /// one frame then pause
    Step,
    Reset,
    SetAnimationSpeed(f32),
    SetAnimation(usize),
    ToggleSlowMotion,
    SetSkinningMethod(EntityId, SkinningMethod),
}

/// Outcome of one frame
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub tasks: usize,
    /// entities that kept their previous buffers
    pub failed: Vec<(String, EngineError)>,
}

/// Owns the animated entities and runs them through the task queue once per frame
pub struct AnimationSystem {
    config: Arc<EngineConfig>,
    entities: Arena<Arc<Mutex<SkinnedEntity>>>,
    queue: TaskQueue,
    controls: Arc<SegQueue<ControlEvent>>,
    handoff: Arc<SnapshotHandoff>,
    playing: bool,
    one_step: bool,
    frame: u64,
}

fn lock(entity: &Mutex<SkinnedEntity>) -> std::sync::MutexGuard<'_, SkinnedEntity> {
    entity.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnimationSystem {
    pub fn new(config: EngineConfig) -> Self {
        let workers = config.worker_count();
        info!("animation system with {} worker threads", workers);
        Self {
            config: Arc::new(config),
            entities: Arena::new(),
            queue: TaskQueue::new(workers),
            controls: Arc::new(SegQueue::new()),
            handoff: Arc::new(SnapshotHandoff::new(RenderSnapshot::default())),
            playing: true,
            one_step: false,
            frame: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_entity(&mut self, entity: SkinnedEntity) -> EntityId {
        debug!("adding entity {}", entity.name);
        self.entities.insert(Arc::new(Mutex::new(entity)))
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<SkinnedEntity> {
        let entity = self.entities.remove(id)?;
        // no task holds a clone between frames
        match Arc::try_unwrap(entity) {
            Ok(mutex) => Some(mutex.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(_) => None,
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<Arc<Mutex<SkinnedEntity>>> {
        self.entities.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn step(&mut self) {
        self.one_step = true;
    }

    pub fn reset(&mut self) {
        for (_, entity) in &self.entities {
            lock(entity).request_reset();
        }
    }

    pub fn set_animation_speed(&mut self, speed: f32) {
        for (_, entity) in &self.entities {
            lock(entity).animator.speed = speed;
        }
    }

    /// Selects the clip on every entity that has it
    pub fn set_animation(&mut self, index: usize) {
        for (_, entity) in &self.entities {
            let mut entity = lock(entity);
            if let Err(err) = entity.set_animation(index) {
                warn!("{}: {}", entity.name, err);
            }
        }
    }

    pub fn toggle_slow_motion(&mut self) {
        for (_, entity) in &self.entities {
            let mut entity = lock(entity);
            entity.animator.slow_motion = !entity.animator.slow_motion;
        }
    }

    pub fn set_skinning_method(&mut self, id: EntityId, method: SkinningMethod) -> Result<()> {
        let entity = self.entities.get(id).ok_or(EngineError::UnknownEntity)?;
        lock(entity).set_skinning_method(method);
        Ok(())
    }

    /// Queue for pushing controls from other threads
    pub fn control_sender(&self) -> Arc<SegQueue<ControlEvent>> {
        self.controls.clone()
    }

    pub fn handoff(&self) -> Arc<SnapshotHandoff> {
        self.handoff.clone()
    }

    pub fn snapshot(&self) -> SnapshotGuard {
        self.handoff.load()
    }

    fn apply_controls(&mut self) {
        while let Some(event) = self.controls.pop() {
            debug!("control event {:?}", event);
            match event {
                ControlEvent::SetPlaying(playing) => self.set_playing(playing),
                ControlEvent::Step => self.step(),
                ControlEvent::Reset => self.reset(),
                ControlEvent::SetAnimationSpeed(speed) => self.set_animation_speed(speed),
                ControlEvent::SetAnimation(index) => self.set_animation(index),
                ControlEvent::ToggleSlowMotion => self.toggle_slow_motion(),
                ControlEvent::SetSkinningMethod(id, method) => {
                    if let Err(err) = self.set_skinning_method(id, method) {
                        warn!("skinning method change ignored: {}", err);
                    }
                }
            }
        }
    }

    /// Builds the frame's task graph, runs it to completion and publishes the buffers.
    /// A failed entity keeps its previous frame's buffers.
    pub fn run_frame(&mut self, dt: f32) -> Result<FrameReport> {
        let start = Instant::now();
        self.apply_controls();
        let play = self.playing || self.one_step;
        let dt = if play { dt } else { 0.0 };

        let mut tasks = 0;
        for (_, entity) in &self.entities {
            let schedule = {
                let entity = lock(entity);
                entity.has_animation() && (play || entity.needs_update())
            };
            if schedule {
                self.queue
                    .register_task(AnimPoseTask::new(entity.clone(), dt, self.config.clone()));
                tasks += 1;
            }
        }

        let started = self.queue.start_tasks();
        self.queue.wait_for_tasks();
        let failures = self.queue.take_failures();
        self.queue.flush_task_queue();
        started?;

        let failed: Vec<(String, EngineError)> = failures
            .into_iter()
            .map(|f| {
                warn!("{} keeps its previous frame", f.name);
                (f.name, f.error)
            })
            .collect();

        if self.one_step {
            self.one_step = false;
            self.playing = false;
        }
        self.frame += 1;

        let entities = self
            .entities
            .iter()
            .map(|(id, entity)| {
                let entity = lock(entity);
                EntitySnapshot {
                    id,
                    name: entity.name.clone(),
                    frame_counter: entity.frame().frame_counter,
                    mesh: entity.frame().current.clone(),
                }
            })
            .collect();
        self.handoff.publish(RenderSnapshot {
            frame: self.frame,
            entities,
        });

        debug!(
            "frame {}: {} tasks, {} failed, {:.3} ms",
            self.frame,
            tasks,
            failed.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        if !failed.is_empty() {
            error!("frame {}: {} entities were not updated", self.frame, failed.len());
        }
        Ok(FrameReport {
            frame: self.frame,
            tasks,
            failed,
        })
    }
}
