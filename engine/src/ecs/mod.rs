//! The entity component system.
//!
//! Data lives in the [`world`]; behavior lives in [`system`]s; the
//! [`schedule`] decides when systems run and which of them may run at the
//! same time, delegating the actual concurrency to the job engine in
//! [`crate::core::tasks`].

pub mod component;
pub mod mask;
pub mod query;
pub mod schedule;
pub mod storage;
pub mod system;
pub mod world;
