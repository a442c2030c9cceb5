pub mod anim_pose;
pub mod task_queue;
pub mod worker_pool;

pub use anim_pose::AnimPoseTask;
pub use task_queue::{FunctionTask, Task, TaskFailure, TaskId, TaskQueue, TaskState, TimerData};
