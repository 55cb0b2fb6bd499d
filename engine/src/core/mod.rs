//! Runtime infrastructure shared by the ECS layer: the worker-pool job
//! engine and logging backends.

pub mod log;
pub mod tasks;

pub use tasks::{Executor, Job, JobError, JobFuture};
