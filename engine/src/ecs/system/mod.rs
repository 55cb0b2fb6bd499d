//! Systems: the units of behavior the scheduler runs each frame.
//!
//! A system declares, once at startup, the [`Access`] it needs: the masks of
//! component types and resources it reads and writes. Those declarations are
//! the whole concurrency contract. The scheduler never inspects what a
//! system actually touches; it runs two systems in parallel exactly when
//! their declared accesses do not conflict.

use super::component::ComponentSet;
use super::mask::Mask;
use super::world::{MAX_ENTITIES, World};

/// A system's declared access: what it reads and what it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: Mask,
    pub write: Mask,
}

impl Access {
    /// No access at all. Such a system conflicts with nothing.
    pub const NONE: Access = Access { read: Mask::EMPTY, write: Mask::EMPTY };

    /// Start building an access declaration against a world's registry.
    pub fn builder(world: &World) -> AccessBuilder<'_> {
        AccessBuilder { world, read: Mask::EMPTY, write: Mask::EMPTY }
    }

    /// True if this access and `other` cannot be exercised concurrently:
    /// one writes something the other reads or writes. Reads never conflict
    /// with reads. Symmetric.
    pub fn conflicts_with(&self, other: &Access) -> bool {
        self.read.intersects(other.write)
            || self.write.intersects(other.read)
            || self.write.intersects(other.write)
    }
}

/// Builder for [`Access`] declarations.
///
/// Resource names are registered on first use, so declaring access to a
/// resource is enough to give it a bit.
pub struct AccessBuilder<'w> {
    world: &'w World,
    read: Mask,
    write: Mask,
}

impl AccessBuilder<'_> {
    /// Declare read access to a set of component types.
    pub fn reads<S: ComponentSet>(mut self) -> Self {
        self.read |= self.world.mask_for::<S>();
        self
    }

    /// Declare write access to a set of component types.
    pub fn writes<S: ComponentSet>(mut self) -> Self {
        self.write |= self.world.mask_for::<S>();
        self
    }

    /// Declare read access to a named resource.
    pub fn reads_resource(mut self, name: &'static str) -> Self {
        self.read |= Mask::bit(self.world.register_resource(name));
        self
    }

    /// Declare write access to a named resource.
    pub fn writes_resource(mut self, name: &'static str) -> Self {
        self.write |= Mask::bit(self.world.register_resource(name));
        self
    }

    /// Declare write access to everything, present and future. Required for
    /// systems that create or destroy entities through [`World::edit`]; the
    /// scheduler will never run such a system alongside anything else.
    pub fn writes_all(mut self) -> Self {
        self.write = Mask::ALL;
        self
    }

    pub fn build(self) -> Access {
        Access { read: self.read, write: self.write }
    }
}

/// Per-invocation context handed to [`System::run`].
///
/// The entity range is the half of the contract that makes sharding work: a
/// split system is invoked once per shard, each invocation restricted to a
/// disjoint slice of the entity table.
#[derive(Debug, Clone, Copy)]
pub struct SystemContext {
    /// Seconds the simulation should advance. The subgraph's fixed timestep,
    /// or the real frame delta for unstepped subgraphs.
    pub delta: f32,
    /// First entity index this invocation covers.
    pub start: u32,
    /// Last entity index this invocation covers, inclusive.
    pub end: u32,
    /// Which shard this invocation is, in `0..shard_count`.
    pub shard: usize,
    /// Total shards of this system this frame. 1 when unsplit.
    pub shard_count: usize,
}

impl SystemContext {
    /// A context covering the whole entity table.
    pub fn full(delta: f32) -> Self {
        SystemContext {
            delta,
            start: 0,
            end: (MAX_ENTITIES - 1) as u32,
            shard: 0,
            shard_count: 1,
        }
    }

    /// A context covering one shard's slice of the table.
    pub fn shard(delta: f32, start: u32, end: u32, shard: usize, shard_count: usize) -> Self {
        SystemContext { delta, start, end, shard, shard_count }
    }
}

/// A unit of behavior run by the scheduler.
///
/// `run` takes `&self` because a split system's shards execute concurrently
/// against the same instance; per-frame mutable state belongs in `pre_run`
/// and `post_run`, which are always invoked serially.
pub trait System: Send + Sync {
    /// Name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Execution-order hint, ascending. Ties run in registration order.
    fn priority(&self) -> i32 {
        0
    }

    /// Inactive systems are skipped for the frame, hooks included.
    fn is_active(&self) -> bool {
        true
    }

    /// How many shard jobs to split this system into when the world is busy
    /// enough and multithreading is on. 1 means never split.
    fn split_jobs(&self) -> usize {
        1
    }

    /// Called once before the first frame. Returns the access declaration
    /// the scheduler will hold this system to.
    fn startup(&mut self, world: &mut World) -> Access;

    /// Serial per-frame setup, before any shard of `run`.
    fn pre_run(&mut self, _world: &World) {}

    /// The system's work for one invocation. May be called concurrently for
    /// different shards of the same frame.
    fn run(&self, ctx: &SystemContext, world: &World);

    /// Serial per-frame teardown, after every shard of `run` has finished.
    fn post_run(&mut self, _world: &World) {}

    /// Called once when the scheduler shuts down.
    fn shutdown(&mut self, _world: &mut World) {}
}
