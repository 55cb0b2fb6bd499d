//! Hazard-aware job-graph execution.
//!
//! A [`Job`] is a unit of work annotated with the 64-bit read and write masks
//! of the state it touches. [`Executor::execute_graph`] partitions a set of
//! jobs into *waves* such that no two jobs in the same wave collide, runs
//! each wave concurrently on the worker pool, and places a barrier between
//! waves. The whole graph has completed when the call returns.
//!
//! # Hazard predicate
//!
//! Two jobs collide when one writes what the other reads or writes:
//! `(read ∩ write') ∪ (write ∩ read') ∪ (write ∩ write') ≠ ∅`. Two pure
//! readers of the same bits never collide. The predicate is conservative:
//! any possible overlap is treated as a full collision, which is what makes
//! the result independent of which job physically executes first.
//!
//! # Shard families
//!
//! Jobs carrying the same *family* id are exempt from mutual collision. The
//! scheduler uses this for a split system's shard jobs: they carry the
//! system's full masks (so they still collide with every *other* system the
//! way the unsplit system would) but operate on disjoint entity ranges, so
//! they may overlap each other freely.
//!
//! # Priority
//!
//! Jobs are considered for wave placement in ascending priority order.
//! Priority is a packing hint only - it never overrides the hazard
//! predicate.
//!
//! # Wave packing
//!
//! Greedy first-fit: each job lands in the first wave it does not collide
//! with. O(n²) in pathological conflict patterns, which is acceptable for
//! typical frame sizes of tens of systems.

use log::trace;

use super::executor::Executor;

/// A schedulable unit of work annotated with access masks.
pub struct Job<'env> {
    name: &'static str,
    read: u64,
    write: u64,
    priority: i32,
    family: Option<usize>,
    work: Box<dyn FnOnce() + Send + 'env>,
}

impl<'env> Job<'env> {
    /// Create a job with the given access masks and priority hint.
    pub fn new(
        name: &'static str,
        read: u64,
        write: u64,
        priority: i32,
        work: Box<dyn FnOnce() + Send + 'env>,
    ) -> Self {
        Self { name, read, write, priority, family: None, work }
    }

    /// Tag this job as a member of a shard family. Jobs in the same family
    /// never collide with each other.
    pub fn with_family(mut self, family: usize) -> Self {
        self.family = Some(family);
        self
    }

    /// The job's name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this job cannot run concurrently with `other`.
    pub fn collides_with(&self, other: &Job<'_>) -> bool {
        if let (Some(a), Some(b)) = (self.family, other.family)
            && a == b
        {
            return false;
        }
        ((self.read & other.write) | (self.write & other.read) | (self.write & other.write)) != 0
    }
}

/// Partition jobs into collision-free waves, considering jobs in ascending
/// priority order.
pub(crate) fn plan_waves(mut jobs: Vec<Job<'_>>) -> Vec<Vec<Job<'_>>> {
    jobs.sort_by_key(|job| job.priority);

    let mut waves: Vec<Vec<Job<'_>>> = Vec::new();
    'next_job: for job in jobs {
        for wave in waves.iter_mut() {
            if !wave.iter().any(|placed| placed.collides_with(&job)) {
                wave.push(job);
                continue 'next_job;
            }
        }
        waves.push(vec![job]);
    }
    waves
}

impl Executor {
    /// Execute a set of mask-annotated jobs, running collision-free subsets
    /// concurrently. Blocks until every job has completed; a panic in any
    /// job aborts the graph and re-raises on the calling thread.
    pub fn execute_graph<'env>(&'env self, jobs: Vec<Job<'env>>) {
        if jobs.is_empty() {
            return;
        }

        let waves = plan_waves(jobs);
        trace!(
            "job graph: {} jobs in {} waves",
            waves.iter().map(Vec::len).sum::<usize>(),
            waves.len()
        );

        for wave in waves {
            self.scope(|s| {
                for job in wave {
                    s.spawn(job.work);
                }
            });
        }
    }
}
