//! Runtime adapters and the scheduler facade.

pub mod api;
pub mod scheduler;
pub mod tokio_spawner;

pub use api::{Health, TaskView};
pub use scheduler::Scheduler;
pub use tokio_spawner::TokioSpawner;
