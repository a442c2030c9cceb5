pub mod animation;
pub mod config;
pub mod entity;
pub mod error;
pub mod job_system;
pub mod math;
pub mod rigfile;
pub mod sim;
pub mod skinning;
pub mod snapshot_handoff;

pub use config::EngineConfig;
pub use entity::SkinnedEntity;
pub use error::{EngineError, Result};
pub use sim::{AnimationSystem, ControlEvent, EntityId};
pub use skinning::SkinningMethod;
