//! The frame scheduler.
//!
//! Systems are grouped into *subgraphs*, each with its own fixed timestep.
//! Per frame the scheduler advances every subgraph: a stepped subgraph
//! accumulates real time and executes once per whole timestep it has
//! banked; an unstepped subgraph executes exactly once with the real frame
//! delta.
//!
//! Each execution runs the subgraph's systems either serially in priority
//! order, or, when the world is busy enough and multithreading is enabled,
//! as a job graph where the job engine overlaps systems whose declared
//! accesses do not conflict. Systems that opt into sharding are further
//! split into per-entity-range jobs that may overlap each other.
//!
//! The declared [`Access`] masks are the sole concurrency contract; the
//! scheduler never inspects what a system actually touches.

use log::{debug, trace};

use crate::core::tasks::{Executor, Job};

use super::system::{Access, System, SystemContext};
use super::world::{MAX_ENTITIES, World};

/// Timesteps below this are treated as "no fixed step": the subgraph runs
/// once per frame with the real delta.
pub const MIN_TIMESTEP: f32 = 1e-6;

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Master switch for the parallel path. Off means every subgraph runs
    /// serially regardless of load.
    pub multithreaded: bool,
    /// Live-entity count a frame must exceed before a subgraph is executed
    /// as a job graph instead of serially.
    pub parallel_threshold: usize,
    /// Live-entity count a frame must exceed before a system that opted
    /// into sharding is actually split.
    pub split_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { multithreaded: true, parallel_threshold: 64, split_threshold: 256 }
    }
}

/// Handle to a subgraph within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgraphId(usize);

struct Registered {
    system: Box<dyn System>,
    access: Access,
}

struct Subgraph {
    name: &'static str,
    timestep: f32,
    accumulator: f32,
    systems: Vec<Registered>,
}

/// Owns the registered systems and drives them frame by frame.
pub struct Scheduler {
    subgraphs: Vec<Subgraph>,
    config: Config,
    started: bool,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        Scheduler { subgraphs: Vec::new(), config, started: false }
    }

    /// Add a subgraph. A `timestep` below [`MIN_TIMESTEP`] (zero included)
    /// means the subgraph runs once per frame with the real delta.
    ///
    /// # Panics
    ///
    /// Panics after [`startup`](Self::startup) has run.
    pub fn add_subgraph(&mut self, name: &'static str, timestep: f32) -> SubgraphId {
        assert!(!self.started, "cannot add subgraph {name} after startup");
        self.subgraphs.push(Subgraph { name, timestep, accumulator: 0.0, systems: Vec::new() });
        SubgraphId(self.subgraphs.len() - 1)
    }

    /// Register a system with a subgraph.
    ///
    /// # Panics
    ///
    /// Panics after [`startup`](Self::startup) has run.
    pub fn add_system<S: System + 'static>(&mut self, subgraph: SubgraphId, system: S) {
        assert!(!self.started, "cannot add system {} after startup", system.name());
        self.subgraphs[subgraph.0]
            .systems
            .push(Registered { system: Box::new(system), access: Access::NONE });
    }

    /// Run every system's `startup` hook in registration order, capture the
    /// access declarations, and fix each subgraph's execution order (by
    /// priority, registration order breaking ties).
    pub fn startup(&mut self, world: &mut World) {
        assert!(!self.started, "startup may only run once");
        for subgraph in &mut self.subgraphs {
            for registered in &mut subgraph.systems {
                registered.access = registered.system.startup(world);
                debug!(
                    "system {} in subgraph {}: read {:?} write {:?}",
                    registered.system.name(),
                    subgraph.name,
                    registered.access.read,
                    registered.access.write
                );
            }
            subgraph.systems.sort_by_key(|registered| registered.system.priority());
        }
        self.started = true;
    }

    /// Advance every subgraph by one frame of `delta` seconds.
    pub fn run_frame(&mut self, world: &World, delta: f32, executor: &Executor) {
        assert!(self.started, "run_frame before startup");

        let live = world.live_count();
        let parallel = self.config.multithreaded && live > self.config.parallel_threshold;
        trace!("frame: {live} live entities, parallel {parallel}");

        for subgraph in &mut self.subgraphs {
            if subgraph.timestep < MIN_TIMESTEP {
                trace!("subgraph {}: unstepped, delta {delta}", subgraph.name);
                Self::execute(subgraph, world, delta, executor, parallel, &self.config, live);
                continue;
            }

            let step = subgraph.timestep;
            subgraph.accumulator += delta;
            while subgraph.accumulator >= step {
                subgraph.accumulator -= step;
                trace!(
                    "subgraph {}: fixed step {step}, banked {}",
                    subgraph.name, subgraph.accumulator
                );
                Self::execute(subgraph, world, step, executor, parallel, &self.config, live);
            }
        }
    }

    /// Run every system's `shutdown` hook, in reverse execution order, and
    /// drop the systems.
    pub fn shutdown(&mut self, world: &mut World) {
        for subgraph in self.subgraphs.iter_mut().rev() {
            for registered in subgraph.systems.iter_mut().rev() {
                registered.system.shutdown(world);
            }
        }
        self.subgraphs.clear();
        self.started = false;
    }

    fn execute(
        subgraph: &mut Subgraph,
        world: &World,
        delta: f32,
        executor: &Executor,
        parallel: bool,
        config: &Config,
        live: usize,
    ) {
        if parallel {
            Self::run_parallel(subgraph, world, delta, executor, config, live);
        } else {
            Self::run_serial(subgraph, world, delta);
        }
    }

    fn run_serial(subgraph: &mut Subgraph, world: &World, delta: f32) {
        let ctx = SystemContext::full(delta);
        for registered in &mut subgraph.systems {
            if !registered.system.is_active() {
                continue;
            }
            registered.system.pre_run(world);
            registered.system.run(&ctx, world);
            registered.system.post_run(world);
        }
    }

    fn run_parallel(
        subgraph: &mut Subgraph,
        world: &World,
        delta: f32,
        executor: &Executor,
        config: &Config,
        live: usize,
    ) {
        let split: Vec<bool> = subgraph
            .systems
            .iter()
            .map(|registered| {
                registered.system.is_active()
                    && registered.system.split_jobs() > 1
                    && live > config.split_threshold
            })
            .collect();

        let mut jobs: Vec<Job<'_>> = Vec::new();
        for (order, registered) in subgraph.systems.iter_mut().enumerate() {
            if !registered.system.is_active() {
                continue;
            }
            let name = registered.system.name();
            let priority = registered.system.priority();
            let read = registered.access.read.bits();
            let write = registered.access.write.bits();

            if split[order] {
                // Shards share the system's masks but carry a family tag so
                // they do not fence each other; their entity ranges are
                // disjoint. The serial hooks stay on this thread.
                registered.system.pre_run(world);
                let shards = partition(MAX_ENTITIES, registered.system.split_jobs());
                let shard_count = shards.len();
                let system: &dyn System = &*registered.system;
                for (index, (start, end)) in shards.into_iter().enumerate() {
                    let ctx = SystemContext::shard(delta, start, end, index, shard_count);
                    jobs.push(
                        Job::new(
                            name,
                            read,
                            write,
                            priority,
                            Box::new(move || system.run(&ctx, world)),
                        )
                        .with_family(order),
                    );
                }
            } else {
                let ctx = SystemContext::full(delta);
                let system = &mut registered.system;
                jobs.push(Job::new(
                    name,
                    read,
                    write,
                    priority,
                    Box::new(move || {
                        system.pre_run(world);
                        system.run(&ctx, world);
                        system.post_run(world);
                    }),
                ));
            }
        }

        executor.execute_graph(jobs);

        for (registered, was_split) in subgraph.systems.iter_mut().zip(&split) {
            if *was_split {
                registered.system.post_run(world);
            }
        }
    }
}

/// Split `[0, len)` into up to `jobs` contiguous inclusive ranges. The
/// final range absorbs the remainder.
fn partition(len: usize, jobs: usize) -> Vec<(u32, u32)> {
    let jobs = jobs.clamp(1, len);
    let base = len / jobs;
    (0..jobs)
        .map(|k| {
            let start = k * base;
            let end = if k == jobs - 1 { len - 1 } else { (k + 1) * base - 1 };
            (start as u32, end as u32)
        })
        .collect()
}
