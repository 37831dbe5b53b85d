//! Runtime: the virtual-time scheduler, the context that owns every engine,
//! and a tokio driver that advances it in wall-clock time.

pub mod context;
pub mod driver;
pub mod scheduler;
pub mod task;

pub use context::{AffectContext, AffectSnapshot};
pub use driver::{spawn_driver, DriverHandle};
pub use scheduler::{FiredTimer, Scheduler, TimerHandle};
pub use task::AffectTask;
