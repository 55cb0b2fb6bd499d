//! helix_engine - a data-oriented ECS runtime with a dependency-aware,
//! auto-parallelizing system scheduler.
//!
//! Systems declare the component types and shared resources they read and
//! write as 64-bit masks. The scheduler uses those masks to run as many
//! systems concurrently as possible on a worker-thread pool while producing
//! the same observable results as strict sequential execution.
//!
//! # Layers
//!
//! - [`core`] - runtime infrastructure: the worker-pool job engine, the
//!   hazard-aware job-graph executor, and logging backends.
//! - [`ecs`] - the entity/component model: world storage, system lifecycle,
//!   dependency masks, subgraph scheduling, and entity iteration.

pub mod core;
pub mod ecs;

pub use ecs::component::{Component, ComponentSet};
pub use ecs::mask::Mask;
pub use ecs::query::GroupIter;
pub use ecs::schedule::{Config, Scheduler, SubgraphId};
pub use ecs::storage::Backing;
pub use ecs::system::{Access, System, SystemContext};
pub use ecs::world::{Entity, MAX_ENTITIES, World, WorldEdit};
