pub mod animator;
pub mod clip;
pub mod pose;
pub mod skeleton;

pub use animator::Animator;
pub use clip::{Animation, TimeWrapMode};
pub use pose::{Pose, RefPose};
pub use skeleton::{BoneKind, Skeleton, SpaceType};
